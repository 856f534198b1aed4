//! Command handler for `mooring deps`.

use colored::Colorize;
use mooring_runtime::Supervisor;

use super::{display_name, report};

pub fn execute(supervisor: &Supervisor, id: &str, install: bool) -> bool {
    let manifest = supervisor.config().dependency_manifest.clone();
    let deps = match supervisor.dependencies(id) {
        Ok(d) => d,
        Err(e) => return report("read dependencies", e),
    };
    let name = display_name(supervisor, id);

    let Some(deps) = deps else {
        println!(
            "{} No {} found for {}.",
            "!".yellow().bold(),
            manifest,
            name.cyan()
        );
        return !install;
    };

    println!(
        "{} {} dependenc{} in {}:",
        "✓".green().bold(),
        deps.len(),
        if deps.len() == 1 { "y" } else { "ies" },
        manifest
    );
    for dep in &deps {
        println!("  {dep}");
    }

    if !install {
        return true;
    }

    println!("\n{} Installing dependencies for {}...", "→".bold(), name.cyan());
    match supervisor.install_dependencies(id) {
        Ok(outcome) => {
            for line in &outcome.output {
                println!("  {}", line.dimmed());
            }
            if outcome.success {
                println!("{} Dependencies installed.", "✓".green().bold());
                true
            } else {
                eprintln!("{} Installer reported a failure.", "✗".red().bold());
                false
            }
        }
        Err(e) => report("install dependencies", e),
    }
}
