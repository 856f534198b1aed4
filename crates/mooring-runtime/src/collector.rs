//! Background collection of child output into the registry's log buffers.
//!
//! Two pump threads read stdout and stderr and hand lines over a channel to
//! one collector thread per run. The collector takes the registry lock only to
//! append lines and, once both streams close, to release the exited handle.

use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::handle::OutputStreams;
use crate::reconcile::reconcile;
use crate::store::Status;
use crate::supervisor::{Shared, State};

const EXIT_SETTLE_ATTEMPTS: u32 = 40;
const EXIT_SETTLE_INTERVAL: Duration = Duration::from_millis(50);

/// Starts pumps and the collector for one run of entry `id`.
pub(crate) fn spawn(shared: Arc<Shared>, id: String, generation: u64, streams: OutputStreams) {
    let (tx, rx) = mpsc::channel();
    if let Some(stdout) = streams.stdout {
        spawn_pump(&id, "stdout", stdout, tx.clone());
    }
    if let Some(stderr) = streams.stderr {
        spawn_pump(&id, "stderr", stderr, tx.clone());
    }
    drop(tx);

    let thread_id = id.clone();
    let spawned = thread::Builder::new()
        .name(format!("collect-{thread_id}"))
        .spawn(move || collect(&shared, &id, generation, rx));
    if let Err(e) = spawned {
        tracing::warn!(id = %thread_id, error = %e, "failed to spawn output collector");
    }
}

fn spawn_pump<R: Read + Send + 'static>(
    id: &str,
    stream: &'static str,
    reader: R,
    tx: Sender<String>,
) {
    let pump_id = id.to_string();
    let spawned = thread::Builder::new()
        .name(format!("{stream}-{id}"))
        .spawn(move || {
            for chunk in BufReader::new(reader).split(b'\n') {
                match chunk {
                    Ok(bytes) => {
                        let line = String::from_utf8_lossy(&bytes)
                            .trim_end_matches(['\r', '\n'])
                            .to_string();
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(id = %pump_id, stream, error = %e, "output read failed, treating stream as closed");
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(id, stream, error = %e, "failed to spawn output pump");
    }
}

fn collect(shared: &Shared, id: &str, generation: u64, rx: Receiver<String>) {
    while let Ok(line) = rx.recv() {
        let mut state = shared.lock_state();
        let Some(buffer) = state.logs.get_mut(id).filter(|b| b.generation() == generation) else {
            // Entry removed or restarted; keep draining so the child never blocks.
            continue;
        };
        buffer.push(line);
        while let Ok(more) = rx.try_recv() {
            buffer.push(more);
        }
    }

    for _ in 0..EXIT_SETTLE_ATTEMPTS {
        if settle(shared, &mut shared.lock_state(), id, generation) {
            return;
        }
        thread::sleep(EXIT_SETTLE_INTERVAL);
    }
    tracing::debug!(id, "output closed but child is still running");
}

/// Releases the handle of a finished run. Returns false while the child is
/// still alive.
fn settle(shared: &Shared, state: &mut State, id: &str, generation: u64) -> bool {
    let current = state
        .logs
        .get(id)
        .is_some_and(|b| b.generation() == generation);
    // A stop in progress holds the handle itself and settles the entry.
    if !current || !state.handles.contains_key(id) {
        return true;
    }

    let probe = shared.probe();
    let State {
        entries, handles, ..
    } = &mut *state;
    let Some(record) = entries.get_mut(id) else {
        return true;
    };
    let before = record.clone();
    if reconcile(id, record, handles, &probe) == Status::Running {
        return false;
    }
    let changed = *record != before;
    tracing::info!(id, "child exited");
    if changed {
        shared.persist_quietly(state, id);
    }
    true
}
