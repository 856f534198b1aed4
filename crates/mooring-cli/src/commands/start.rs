//! Command handler for `mooring start`.

use colored::Colorize;
use mooring_runtime::{StartOutcome, Status, Supervisor};
use std::time::Duration;

use super::{display_name, report, stop, Mode};

const FOLLOW_INTERVAL: Duration = Duration::from_millis(200);
const DRAIN_DELAY: Duration = Duration::from_millis(100);

pub fn execute(supervisor: &Supervisor, id: &str, mode: Mode) -> bool {
    let name = display_name(supervisor, id);
    match supervisor.start(id) {
        Ok(StartOutcome::Started) => {
            let pid = supervisor
                .get(id)
                .and_then(|e| e.pid)
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{} Started {} (pid {})",
                "✓".green().bold(),
                name.cyan(),
                pid
            );
        }
        Ok(StartOutcome::AlreadyRunning) => {
            println!("{} {} is already running.", "!".yellow().bold(), name.cyan());
            return true;
        }
        Err(e) => return report(&format!("start {name}"), e),
    }

    match mode {
        Mode::Console => true,
        Mode::OneShot => follow(supervisor, id, &name),
    }
}

/// Prints output until the child exits. Ctrl-C stops the entry.
fn follow(supervisor: &Supervisor, id: &str, name: &str) -> bool {
    println!("  Following output, press {} to stop.\n", "Ctrl-C".bold());
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => return report("start output follower", e),
    };
    runtime.block_on(follow_loop(supervisor, id, name))
}

async fn follow_loop(supervisor: &Supervisor, id: &str, name: &str) -> bool {
    let mut seen = 0;
    let mut ticker = tokio::time::interval(FOLLOW_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                seen = print_new_lines(supervisor, id, seen);
                match supervisor.status(id) {
                    Some(Status::Running) => {}
                    Some(status) => {
                        tokio::time::sleep(DRAIN_DELAY).await;
                        print_new_lines(supervisor, id, seen);
                        println!("\n{} {} exited ({}).", "!".yellow().bold(), name.cyan(), status);
                        return status != Status::Error;
                    }
                    None => return true,
                }
            }
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                }
                println!();
                let stopped = stop::execute(supervisor, id);
                print_new_lines(supervisor, id, seen);
                return stopped;
            }
        }
    }
}

fn print_new_lines(supervisor: &Supervisor, id: &str, seen: u64) -> u64 {
    let (lines, total) = supervisor.logs_after(id, seen);
    for line in lines {
        println!("  {line}");
    }
    total
}
