//! Command handler for `mooring console`.
//!
//! Children stay attached to this process, so a console session is where
//! several entries can run side by side with their output collected.

use clap::Parser;
use colored::Colorize;
use mooring_runtime::{Status, Supervisor};
use std::io::{self, BufRead, Write};

use super::{dispatch, stop, Commands, Mode};

#[derive(Parser)]
#[command(name = "mooring", no_binary_name = true, disable_version_flag = true)]
struct ConsoleLine {
    #[command(subcommand)]
    command: Commands,
}

pub fn execute(supervisor: &Supervisor) -> bool {
    println!(
        "{} Console ready. Type {} for commands, {} to leave.",
        "✓".green().bold(),
        "help".bold(),
        "quit".bold()
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{} ", "mooring>".bold());
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "failed to read console input");
                break;
            }
            None => {
                println!();
                break;
            }
        };

        let words = match split_words(&line) {
            Ok(words) => words,
            Err(e) => {
                eprintln!("{} {}", "✗".red().bold(), e);
                continue;
            }
        };
        match words.first().map(String::as_str) {
            None => continue,
            Some("quit" | "exit") => break,
            Some(_) => {}
        }

        match ConsoleLine::try_parse_from(words) {
            Ok(parsed) => {
                dispatch(supervisor, parsed.command, Mode::Console);
            }
            Err(e) => {
                let _ = e.print();
            }
        }
    }

    stop_running(supervisor)
}

/// Stops every entry this session left running.
fn stop_running(supervisor: &Supervisor) -> bool {
    let mut ok = true;
    for entry in supervisor.list() {
        if entry.status == Status::Running {
            ok &= stop::execute(supervisor, &entry.id);
        }
    }
    ok
}

/// Splits a console line on whitespace, honouring single and double quotes.
fn split_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("unterminated {q} quote"));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
