//! Command handler for `mooring logs`.

use colored::Colorize;
use mooring_runtime::Supervisor;

use super::display_name;

pub fn execute(supervisor: &Supervisor, id: &str, tail: usize) -> bool {
    if supervisor.get(id).is_none() {
        eprintln!("{} Entry {} not found.", "✗".red().bold(), id.cyan());
        return false;
    }
    let name = display_name(supervisor, id);

    let lines = supervisor.logs(id);
    if lines.is_empty() {
        println!(
            "{} No output recorded for {} in this session.",
            "!".yellow().bold(),
            name.cyan()
        );
        return true;
    }

    let skip = lines.len().saturating_sub(tail);
    let shown = &lines[skip..];
    println!(
        "{} Last {} line(s) for {}:\n",
        "✓".green().bold(),
        shown.len(),
        name.cyan()
    );
    for line in shown {
        println!("  {line}");
    }
    true
}
