//! Command handler for `mooring add`.

use colored::Colorize;
use mooring_runtime::Supervisor;
use std::path::Path;

use super::report;

pub fn execute(supervisor: &Supervisor, name: &str, path: &Path, entry: &str, port: u16) -> bool {
    match supervisor.add(name, path, entry, port) {
        Ok(id) => {
            println!(
                "{} Added {} as {}",
                "✓".green().bold(),
                name.trim().cyan(),
                id.bold()
            );
            println!("  Run {} to launch it.", format!("mooring start {id}").bold());
            true
        }
        Err(e) => report("add entry", e),
    }
}
