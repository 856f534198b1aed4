//! Error types returned across the supervisor boundary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reading or writing the persisted entry registry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Failures surfaced by [`crate::Supervisor`] operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("entry {0} not found")]
    NotFound(String),

    #[error("failed to launch entry {id}: {source}")]
    Launch {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to terminate entry {id} (pid {pid}): {source}")]
    Termination {
        id: String,
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// The in-memory change was applied but may not survive a restart.
    #[error("entry {id} was updated but state could not be saved: {source}")]
    Persistence {
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("{0}")]
    Project(String),
}

impl SupervisorError {
    /// Returns true when the error only reports a failed state write.
    pub fn is_persistence(&self) -> bool {
        matches!(self, SupervisorError::Persistence { .. })
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
