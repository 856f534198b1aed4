//! Command handler for `mooring status`.

use colored::Colorize;
use mooring_runtime::Supervisor;

use super::list::{colored_status, print_json, print_table};

pub fn execute(supervisor: &Supervisor, id: Option<&str>, json: bool) -> bool {
    let Some(id) = id else {
        let entries = supervisor.list();
        if json {
            return print_json(&entries);
        }
        if entries.is_empty() {
            println!("{} No entries registered.", "!".yellow().bold());
            return true;
        }
        println!("{} Entry status:\n", "✓".green().bold());
        print_table(&entries);
        return true;
    };

    let Some(entry) = supervisor.get(id) else {
        eprintln!("{} Entry {} not found.", "✗".red().bold(), id.cyan());
        return false;
    };

    if json {
        return print_json(&entry);
    }

    println!();
    println!("  {} {}", entry.name.bold(), colored_status(entry.status));
    println!("  {:<14} {}", "Id:".dimmed(), entry.id);
    println!("  {:<14} {}", "Path:".dimmed(), entry.path.display());
    println!("  {:<14} {}", "Entry point:".dimmed(), entry.entry_point);
    println!("  {:<14} {}", "Port:".dimmed(), entry.port);
    if let Some(pid) = entry.pid {
        println!("  {:<14} {}", "PID:".dimmed(), pid);
    }
    println!(
        "  {:<14} {}",
        "Added:".dimmed(),
        entry.added_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    true
}
