//! Command handler for `mooring stop`.

use colored::Colorize;
use mooring_runtime::{StopOutcome, Supervisor};

use super::{display_name, report};

pub fn execute(supervisor: &Supervisor, id: &str) -> bool {
    let name = display_name(supervisor, id);
    match supervisor.stop(id) {
        Ok(StopOutcome::Stopped) => {
            println!("{} Stopped {}", "✓".green().bold(), name.cyan());
            true
        }
        Ok(StopOutcome::AlreadyStopped) => {
            println!("{} {} is not running.", "!".yellow().bold(), name.cyan());
            true
        }
        Err(e) => report(&format!("stop {name}"), e),
    }
}
