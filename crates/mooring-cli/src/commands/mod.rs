//! CLI subcommand declarations and dispatch.

pub mod add;
pub mod console;
pub mod deps;
pub mod files;
pub mod list;
pub mod logs;
pub mod remove;
pub mod start;
pub mod status;
pub mod stop;

use clap::Subcommand;
use colored::Colorize;
use mooring_runtime::Supervisor;
use std::path::PathBuf;

use crate::{paths, settings};

/// Top-level CLI subcommands supported by `mooring`.
#[derive(Subcommand)]
pub enum Commands {
    /// Register a program directory
    Add {
        /// Display name
        name: String,
        /// Directory holding the program
        path: PathBuf,
        /// Entry point file inside the directory
        #[arg(long, default_value = "main.py")]
        entry: String,
        /// Port the program is expected to serve on
        #[arg(long, default_value_t = 5000)]
        port: u16,
    },

    /// Stop and unregister an entry
    Remove {
        /// Entry id
        id: String,
    },

    /// Start an entry and follow its output
    Start {
        /// Entry id
        id: String,
    },

    /// Stop a running entry
    Stop {
        /// Entry id
        id: String,
    },

    /// Show the status of one or all entries
    Status {
        /// Entry id (all entries if omitted)
        id: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show recent output of an entry
    Logs {
        /// Entry id
        id: String,
        /// Number of lines to show
        #[arg(long, default_value_t = 100)]
        tail: usize,
    },

    /// List registered entries
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show or install an entry's dependencies
    Deps {
        /// Entry id
        id: String,
        /// Run the configured installer
        #[arg(long)]
        install: bool,
    },

    /// Show known project files of an entry
    Files {
        /// Entry id
        id: String,
        /// Print one file from the entry directory
        #[arg(long)]
        show: Option<PathBuf>,
    },

    /// Run an interactive session that keeps children supervised
    Console,
}

/// How a command runs: a one-shot invocation or a line inside `console`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    OneShot,
    Console,
}

/// Opens the registry and routes the parsed subcommand to its handler.
///
/// Returns false when the command failed.
pub fn execute(command: Commands) -> bool {
    let Some(supervisor) = open_supervisor() else {
        return false;
    };
    match command {
        Commands::Console => console::execute(&supervisor),
        other => dispatch(&supervisor, other, Mode::OneShot),
    }
}

/// Runs one subcommand against an open supervisor.
pub fn dispatch(supervisor: &Supervisor, command: Commands, mode: Mode) -> bool {
    match command {
        Commands::Add {
            name,
            path,
            entry,
            port,
        } => add::execute(supervisor, &name, &path, &entry, port),
        Commands::Remove { id } => remove::execute(supervisor, &id),
        Commands::Start { id } => start::execute(supervisor, &id, mode),
        Commands::Stop { id } => stop::execute(supervisor, &id),
        Commands::Status { id, json } => status::execute(supervisor, id.as_deref(), json),
        Commands::Logs { id, tail } => logs::execute(supervisor, &id, tail),
        Commands::List { json } => list::execute(supervisor, json),
        Commands::Deps { id, install } => deps::execute(supervisor, &id, install),
        Commands::Files { id, show } => files::execute(supervisor, &id, show.as_deref()),
        Commands::Console => {
            eprintln!("{} Already in a console session.", "!".yellow().bold());
            false
        }
    }
}

fn open_supervisor() -> Option<Supervisor> {
    let (Some(state_path), Some(config_path)) = (paths::state_path(), paths::config_path()) else {
        eprintln!("{} Could not determine home directory.", "✗".red().bold());
        return None;
    };

    let config = match settings::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            return None;
        }
    };

    match Supervisor::open(state_path, config) {
        Ok(s) => Some(s),
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            None
        }
    }
}

/// Prints a failed operation on stderr and returns false.
pub(crate) fn report(action: &str, err: impl std::fmt::Display) -> bool {
    eprintln!("{} Failed to {}: {}", "✗".red().bold(), action, err);
    false
}

/// Looks up the display name of an entry, falling back to the id.
pub(crate) fn display_name(supervisor: &Supervisor, id: &str) -> String {
    supervisor
        .get(id)
        .map(|e| e.name)
        .unwrap_or_else(|| id.to_string())
}
