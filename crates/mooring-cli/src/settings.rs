//! Loading of `config.toml` into supervisor settings.

use mooring_runtime::SupervisorConfig;
use std::fs;
use std::io;
use std::path::Path;

/// Reads settings from `path`, falling back to defaults when the file is absent.
pub fn load(path: &Path) -> Result<SupervisorConfig, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SupervisorConfig::default()),
        Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
    };
    toml::from_str(&content).map_err(|e| format!("invalid settings in {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.runtime, "python");
        assert_eq!(config.log_lines, 100);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "runtime = \"sh\"\ngrace_period_secs = 1\n").unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.runtime, "sh");
        assert_eq!(config.grace_period_secs, 1);
        assert_eq!(config.installer, "pip");
    }

    #[test]
    fn malformed_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "log_lines = \"many\"\n").unwrap();
        let err = load(&path).unwrap_err();
        assert!(err.contains("invalid settings"));
    }
}
