use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RUNTIME: &str = "python";
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;
pub const DEFAULT_LOG_LINES: usize = 100;

/// Tunables for a [`crate::Supervisor`], loadable from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Interpreter used to launch entry points. Also the program name a
    /// remembered pid must carry to be trusted after a restart.
    pub runtime: String,
    pub grace_period_secs: u64,
    pub log_lines: usize,
    pub dependency_manifest: String,
    pub installer: String,
    pub installer_args: Vec<String>,
    /// Extra environment for launched children.
    pub env: BTreeMap<String, String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        SupervisorConfig {
            runtime: DEFAULT_RUNTIME.to_string(),
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            log_lines: DEFAULT_LOG_LINES,
            dependency_manifest: "requirements.txt".to_string(),
            installer: "pip".to_string(),
            installer_args: vec!["install".to_string(), "-r".to_string()],
            env,
        }
    }
}

impl SupervisorConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Resolves the interpreter for an entry directory.
    pub fn interpreter_for(&self, entry_dir: &Path) -> PathBuf {
        resolve_tool(entry_dir, &self.runtime)
    }

    /// Resolves the dependency installer for an entry directory.
    pub fn installer_for(&self, entry_dir: &Path) -> PathBuf {
        resolve_tool(entry_dir, &self.installer)
    }
}

/// Prefers `<dir>/venv/bin/<tool>` and falls back to `<tool>` on `PATH`.
pub fn resolve_tool(entry_dir: &Path, tool: &str) -> PathBuf {
    let local = entry_dir.join("venv").join("bin").join(tool);
    if local.exists() {
        local
    } else {
        PathBuf::from(tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: SupervisorConfig = toml::from_str("runtime = \"sh\"\nlog_lines = 20\n").unwrap();
        assert_eq!(config.runtime, "sh");
        assert_eq!(config.log_lines, 20);
        assert_eq!(config.grace_period(), Duration::from_secs(5));
        assert_eq!(config.installer, "pip");
    }

    #[test]
    fn interpreter_prefers_project_venv() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SupervisorConfig::default();
        assert_eq!(config.interpreter_for(tmp.path()), PathBuf::from("python"));

        let bin = tmp.path().join("venv/bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("python"), "").unwrap();
        assert_eq!(config.interpreter_for(tmp.path()), bin.join("python"));
        assert_eq!(config.installer_for(tmp.path()), PathBuf::from("pip"));
    }
}
