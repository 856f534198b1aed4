use std::path::PathBuf;

pub fn mooring_home() -> Option<PathBuf> {
    // Allow override via MOORING_HOME for testing
    if let Ok(home) = std::env::var("MOORING_HOME") {
        return Some(PathBuf::from(home));
    }
    dirs::home_dir().map(|h| h.join(".mooring"))
}

/// Persisted entry registry.
pub fn state_path() -> Option<PathBuf> {
    mooring_home().map(|h| h.join("entries.toml"))
}

/// Optional supervisor settings.
pub fn config_path() -> Option<PathBuf> {
    mooring_home().map(|h| h.join("config.toml"))
}
