// SPDX-License-Identifier: Apache-2.0

//! Process supervisor for locally developed programs.
//!
//! A [`Supervisor`] keeps a registry of entries (a program plus its working
//! directory), launches them as child processes, collects their output into
//! bounded buffers, and stops them on demand. Entry state is persisted to a
//! TOML file and reconciled against the OS on every read, so a restarted
//! supervisor recognizes children that outlived it.

mod collector;
pub mod config;
pub mod error;
pub mod handle;
pub mod logs;
pub mod os;
pub mod project;
mod reconcile;
pub mod store;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::{StoreError, SupervisorError};
pub use os::{ProcessTable, SystemProcessTable};
pub use project::{InstallReport, ProjectFile, ProjectFiles};
pub use store::Status;
pub use supervisor::{EntrySnapshot, StartOutcome, StopOutcome, Supervisor};

/// Returns crate version for runtime diagnostics/tests.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
