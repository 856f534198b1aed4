//! Command handler for `mooring list`.

use colored::{ColoredString, Colorize};
use mooring_runtime::{EntrySnapshot, Status, Supervisor};

use super::report;

pub fn execute(supervisor: &Supervisor, json: bool) -> bool {
    let entries = supervisor.list();

    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("{} No entries registered.\n", "!".yellow().bold());
        println!(
            "  Run {} to register one.",
            "mooring add <name> <path>".bold()
        );
        return true;
    }

    println!(
        "{} {} entr{} registered:\n",
        "✓".green().bold(),
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" }
    );
    print_table(&entries);
    true
}

pub(crate) fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => {
            println!("{rendered}");
            true
        }
        Err(e) => report("render JSON", e),
    }
}

pub(crate) fn print_table(entries: &[EntrySnapshot]) {
    println!(
        "  {:<38} {:<20} {:<10} {:<8} {:<6} {}",
        "ID".bold(),
        "NAME".bold(),
        "STATUS".bold(),
        "PID".bold(),
        "PORT".bold(),
        "PATH".bold(),
    );
    println!("  {}", "─".repeat(96));

    for entry in entries {
        let pid = entry
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<38} {:<20} {:<10} {:<8} {:<6} {}",
            entry.id,
            entry.name.cyan(),
            colored_status(entry.status),
            pid,
            entry.port,
            entry.path.join(&entry.entry_point).display(),
        );
    }
    println!();
}

pub(crate) fn colored_status(status: Status) -> ColoredString {
    match status {
        Status::Running => status.to_string().green(),
        Status::Stopped => status.to_string().dimmed(),
        Status::Error => status.to_string().red(),
    }
}
