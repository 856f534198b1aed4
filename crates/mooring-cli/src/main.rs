//! Mooring CLI binary entrypoint.

mod commands;
pub mod paths;
pub mod settings;

use clap::Parser;
use commands::Commands;
use std::process;
use tracing_subscriber::EnvFilter;

/// Mooring: run and watch locally developed programs
#[derive(Parser)]
#[command(name = "mooring", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Parses CLI arguments and dispatches to command handlers.
fn main() {
    init_tracing();
    let cli = Cli::parse();
    if !commands::execute(cli.command) {
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MOORING_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
