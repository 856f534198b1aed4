//! Command handler for `mooring remove`.

use colored::Colorize;
use mooring_runtime::Supervisor;

use super::{display_name, report};

pub fn execute(supervisor: &Supervisor, id: &str) -> bool {
    let name = display_name(supervisor, id);
    match supervisor.remove(id) {
        Ok(true) => {
            println!("{} Removed {}", "✓".green().bold(), name.cyan());
            true
        }
        Ok(false) => {
            eprintln!("{} Entry {} not found.", "✗".red().bold(), id.cyan());
            false
        }
        Err(e) => report(&format!("remove {name}"), e),
    }
}
