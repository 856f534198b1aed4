//! Command handler for `mooring files`.

use colored::Colorize;
use mooring_runtime::{ProjectFile, Supervisor};
use std::path::Path;

use super::report;

pub fn execute(supervisor: &Supervisor, id: &str, show: Option<&Path>) -> bool {
    if let Some(file) = show {
        return match supervisor.file_content(id, file) {
            Ok(content) => {
                print!("{content}");
                if !content.ends_with('\n') {
                    println!();
                }
                true
            }
            Err(e) => report(&format!("read {}", file.display()), e),
        };
    }

    let files = match supervisor.project_files(id) {
        Ok(f) => f,
        Err(e) => return report("list project files", e),
    };

    let groups = [
        ("Documentation", &files.documentation),
        ("Configuration", &files.configuration),
        ("Dependencies", &files.dependencies),
    ];
    if groups.iter().all(|(_, list)| list.is_empty()) {
        println!("{} No known project files found.", "!".yellow().bold());
        return true;
    }

    for (title, list) in groups {
        if list.is_empty() {
            continue;
        }
        println!("\n  {}", title.underline().bold());
        for file in list {
            print_file(file);
        }
    }
    println!();
    true
}

fn print_file(file: &ProjectFile) {
    let modified = file
        .modified
        .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {:<20} {:>8} B  {}",
        file.name.cyan(),
        file.size,
        modified.dimmed()
    );
    match &file.preview {
        Some(preview) => {
            if let Some(first) = preview.lines().find(|l| !l.trim().is_empty()) {
                println!("    {}", first.dimmed());
            }
        }
        None => println!("    {}", "(binary or unreadable)".dimmed()),
    }
}
