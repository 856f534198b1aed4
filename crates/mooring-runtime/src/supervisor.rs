//! The entry registry and its lock discipline.
//!
//! Entries, live handles and log buffers sit behind one mutex and are only
//! reachable through [`Supervisor`] methods. Mutating operations on the same
//! entry are additionally serialized by a per-entry gate, which is held across
//! process creation and the termination wait so the registry mutex never is.
//! Lock order is always gate, then registry mutex.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::collector;
use crate::config::SupervisorConfig;
use crate::error::{Result, StoreError, SupervisorError};
use crate::handle::{LaunchSpec, ProcessHandle};
use crate::logs::LogBuffer;
use crate::os::{self, ProcessTable, SystemProcessTable};
use crate::project::{self, InstallReport, ProjectFiles};
use crate::reconcile::{reconcile, Probe};
use crate::store::{EntryRecord, Status, Store};

/// Result of attempting to start an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Result of attempting to stop an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
}

/// Reconciled view of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySnapshot {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub entry_point: String,
    pub port: u16,
    pub status: Status,
    pub added_at: DateTime<Utc>,
    pub pid: Option<u32>,
}

impl EntrySnapshot {
    fn new(id: &str, record: &EntryRecord) -> Self {
        EntrySnapshot {
            id: id.to_string(),
            name: record.name.clone(),
            path: record.path.clone(),
            entry_point: record.entry_point.clone(),
            port: record.port,
            status: record.status,
            added_at: record.added_at,
            pid: record.pid,
        }
    }
}

#[derive(Default)]
pub(crate) struct State {
    pub(crate) entries: BTreeMap<String, EntryRecord>,
    pub(crate) handles: HashMap<String, ProcessHandle>,
    pub(crate) logs: HashMap<String, LogBuffer>,
    next_generation: u64,
}

/// State shared between the supervisor and its output collectors.
pub(crate) struct Shared {
    state: Mutex<State>,
    store: Store,
    table: Arc<dyn ProcessTable>,
    config: SupervisorConfig,
}

impl Shared {
    /// Locks the registry, recovering the data if a holder panicked.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn probe(&self) -> Probe<'_> {
        Probe {
            table: self.table.as_ref(),
            runtime: &self.config.runtime,
        }
    }

    /// Rewrites the state file. Called with the registry lock held.
    pub(crate) fn persist(&self, state: &State, id: &str) -> Result<()> {
        self.store
            .save(&state.entries)
            .map_err(|source| SupervisorError::Persistence {
                id: id.to_string(),
                source,
            })
    }

    /// Persists after a reconciliation-only change, logging failures.
    pub(crate) fn persist_quietly(&self, state: &State, id: &str) {
        if let Err(e) = self.persist(state, id) {
            tracing::warn!(id, error = %e, "failed to save reconciled state");
        }
    }

    /// Reconciles one entry, persisting if the record changed.
    fn reconcile_entry(&self, state: &mut State, id: &str) -> Option<Status> {
        let probe = self.probe();
        let State {
            entries, handles, ..
        } = &mut *state;
        let record = entries.get_mut(id)?;
        let before = record.clone();
        let status = reconcile(id, record, handles, &probe);
        let changed = *record != before;
        if changed {
            self.persist_quietly(state, id);
        }
        Some(status)
    }
}

enum StopTarget {
    Handle(ProcessHandle),
    Pid(u32),
}

impl StopTarget {
    fn pid(&self) -> u32 {
        match self {
            StopTarget::Handle(handle) => handle.pid(),
            StopTarget::Pid(pid) => *pid,
        }
    }
}

/// Supervises registered entries and their child processes.
///
/// Dropping a supervisor does not stop its children; a later supervisor
/// opened on the same state file picks them up through their remembered pids.
pub struct Supervisor {
    shared: Arc<Shared>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Supervisor {
    /// Opens the registry stored at `state_path`, reconciling every entry.
    pub fn open<P: Into<PathBuf>>(
        state_path: P,
        config: SupervisorConfig,
    ) -> std::result::Result<Self, StoreError> {
        Self::open_with_table(state_path, config, Arc::new(SystemProcessTable))
    }

    /// Opens the registry with a custom process table.
    pub fn open_with_table<P: Into<PathBuf>>(
        state_path: P,
        config: SupervisorConfig,
        table: Arc<dyn ProcessTable>,
    ) -> std::result::Result<Self, StoreError> {
        let store = Store::new(state_path);
        let existed = store.path().exists();
        let mut entries = store.load()?;

        let mut handles = HashMap::new();
        let probe = Probe {
            table: table.as_ref(),
            runtime: &config.runtime,
        };
        let mut changed = false;
        for (id, record) in entries.iter_mut() {
            let before = record.clone();
            reconcile(id, record, &mut handles, &probe);
            changed |= *record != before;
        }
        if changed || !existed {
            if let Err(e) = store.save(&entries) {
                tracing::warn!(path = %store.path().display(), error = %e, "failed to save reconciled state");
            }
        }
        tracing::info!(
            path = %store.path().display(),
            entries = entries.len(),
            "opened registry"
        );

        Ok(Supervisor {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    entries,
                    ..State::default()
                }),
                store,
                table,
                config,
            }),
            gates: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    pub fn state_path(&self) -> &Path {
        self.shared.store.path()
    }

    /// Registers a new stopped entry and returns its id.
    pub fn add(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        entry_point: &str,
        port: u16,
    ) -> Result<String> {
        let name = name.trim();
        let entry_point = entry_point.trim();
        let path = path.as_ref();
        if name.is_empty() {
            return Err(SupervisorError::Validation(
                "name must not be empty".to_string(),
            ));
        }
        if path.as_os_str().is_empty() {
            return Err(SupervisorError::Validation(
                "path must not be empty".to_string(),
            ));
        }
        if entry_point.is_empty() {
            return Err(SupervisorError::Validation(
                "entry point must not be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(SupervisorError::Validation(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        let path = match fs::canonicalize(path) {
            Ok(p) if p.is_dir() => p,
            Ok(p) => {
                return Err(SupervisorError::Validation(format!(
                    "path {} is not a directory",
                    p.display()
                )))
            }
            Err(_) => {
                return Err(SupervisorError::Validation(format!(
                    "path {} does not exist",
                    path.display()
                )))
            }
        };

        let mut state = self.shared.lock_state();
        if let Some(other) = state.entries.values().find(|e| e.port == port) {
            return Err(SupervisorError::Validation(format!(
                "port {port} is already used by {}",
                other.name
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        state.entries.insert(
            id.clone(),
            EntryRecord {
                name: name.to_string(),
                path,
                entry_point: entry_point.to_string(),
                port,
                status: Status::Stopped,
                added_at: Utc::now(),
                pid: None,
            },
        );
        tracing::info!(id = %id, name, port, "added entry");
        self.shared.persist(&state, &id)?;
        Ok(id)
    }

    /// Stops (if needed) and deletes an entry. Returns `Ok(false)` for an
    /// unknown id.
    ///
    /// If the stop fails the entry is kept, so a live process is never
    /// orphaned from the registry.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let gate = self.gate(id);
        let _op = gate.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.shared.lock_state().entries.contains_key(id) {
            return Ok(false);
        }

        match self.stop_gated(id) {
            Ok(_) => {}
            Err(e) if e.is_persistence() => {
                tracing::warn!(id, error = %e, "continuing removal after failed save");
            }
            Err(e) => return Err(e),
        }

        let mut state = self.shared.lock_state();
        state.entries.remove(id);
        state.logs.remove(id);
        state.handles.remove(id);
        tracing::info!(id, "removed entry");
        let persisted = self.shared.persist(&state, id);
        drop(state);

        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        persisted.map(|()| true)
    }

    /// Launches an entry unless it is already running.
    pub fn start(&self, id: &str) -> Result<StartOutcome> {
        let gate = self.gate(id);
        let _op = gate.lock().unwrap_or_else(PoisonError::into_inner);

        let (working_dir, entry_point) = {
            let mut state = self.shared.lock_state();
            match self.shared.reconcile_entry(&mut state, id) {
                None => return Err(SupervisorError::NotFound(id.to_string())),
                Some(Status::Running) => {
                    tracing::info!(id, "entry is already running");
                    return Ok(StartOutcome::AlreadyRunning);
                }
                Some(_) => {}
            }
            let record = &state.entries[id];
            (record.path.clone(), record.entry_point.clone())
        };

        let config = &self.shared.config;
        let interpreter = config.interpreter_for(&working_dir);
        let spawned = ProcessHandle::spawn(&LaunchSpec {
            interpreter: &interpreter,
            working_dir: &working_dir,
            entry_point: &entry_point,
            env: &config.env,
        });

        let mut state = self.shared.lock_state();
        let (handle, streams) = match spawned {
            Ok(spawned) => spawned,
            Err(source) => {
                if let Some(record) = state.entries.get_mut(id) {
                    record.status = Status::Error;
                    record.pid = None;
                }
                tracing::error!(id, error = %source, "failed to launch entry");
                self.shared.persist_quietly(&state, id);
                return Err(SupervisorError::Launch {
                    id: id.to_string(),
                    source,
                });
            }
        };

        let pid = handle.pid();
        state.next_generation += 1;
        let generation = state.next_generation;
        state
            .logs
            .insert(id.to_string(), LogBuffer::new(config.log_lines, generation));
        state.handles.insert(id.to_string(), handle);
        if let Some(record) = state.entries.get_mut(id) {
            record.status = Status::Running;
            record.pid = Some(pid);
        }
        let persisted = self.shared.persist(&state, id);
        drop(state);

        collector::spawn(Arc::clone(&self.shared), id.to_string(), generation, streams);
        tracing::info!(id, pid, interpreter = %interpreter.display(), "started entry");
        persisted.map(|()| StartOutcome::Started)
    }

    /// Terminates an entry's process: SIGTERM, grace period, then SIGKILL.
    pub fn stop(&self, id: &str) -> Result<StopOutcome> {
        let gate = self.gate(id);
        let _op = gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.stop_gated(id)
    }

    /// Stop body. The caller holds the entry's gate.
    fn stop_gated(&self, id: &str) -> Result<StopOutcome> {
        let mut target = {
            let mut state = self.shared.lock_state();
            let status = self
                .shared
                .reconcile_entry(&mut state, id)
                .ok_or_else(|| SupervisorError::NotFound(id.to_string()))?;
            if status != Status::Running {
                if status == Status::Error {
                    if let Some(record) = state.entries.get_mut(id) {
                        record.status = Status::Stopped;
                    }
                    self.shared.persist(&state, id)?;
                }
                return Ok(StopOutcome::AlreadyStopped);
            }

            // The remembered pid stays recorded while the handle is out of
            // the map, so concurrent readers still see the process.
            match state.handles.remove(id) {
                Some(handle) => StopTarget::Handle(handle),
                None => match state.entries.get(id).and_then(|r| r.pid) {
                    Some(pid) => StopTarget::Pid(pid),
                    None => return Ok(StopOutcome::AlreadyStopped),
                },
            }
        };

        let pid = target.pid();
        let table = self.shared.table.as_ref();
        let grace = self.shared.config.grace_period();
        let terminated = match &mut target {
            StopTarget::Handle(handle) => handle.terminate(table, grace),
            StopTarget::Pid(pid) => os::terminate_pid(table, *pid, grace),
        };

        let mut state = self.shared.lock_state();
        match terminated {
            Ok(()) => {
                if let Some(record) = state.entries.get_mut(id) {
                    record.status = Status::Stopped;
                    record.pid = None;
                }
                tracing::info!(id, pid, "stopped entry");
                self.shared.persist(&state, id)?;
                Ok(StopOutcome::Stopped)
            }
            Err(source) => {
                let still_alive = match target {
                    StopTarget::Handle(mut handle) => {
                        let alive = !handle.has_exited();
                        if alive {
                            state.handles.insert(id.to_string(), handle);
                        }
                        alive
                    }
                    StopTarget::Pid(pid) => table.is_alive(pid),
                };
                if let Some(record) = state.entries.get_mut(id) {
                    if still_alive {
                        record.status = Status::Running;
                        record.pid = Some(pid);
                    } else {
                        record.status = Status::Stopped;
                        record.pid = None;
                    }
                }
                tracing::error!(id, pid, error = %source, "failed to terminate entry");
                self.shared.persist_quietly(&state, id);
                Err(SupervisorError::Termination {
                    id: id.to_string(),
                    pid,
                    source,
                })
            }
        }
    }

    /// Reconciled status, or `None` for an unknown id.
    pub fn status(&self, id: &str) -> Option<Status> {
        let mut state = self.shared.lock_state();
        self.shared.reconcile_entry(&mut state, id)
    }

    /// Reconciled snapshot of one entry.
    pub fn get(&self, id: &str) -> Option<EntrySnapshot> {
        let mut state = self.shared.lock_state();
        self.shared.reconcile_entry(&mut state, id)?;
        state.entries.get(id).map(|r| EntrySnapshot::new(id, r))
    }

    /// Recent output lines, oldest first.
    pub fn logs(&self, id: &str) -> Vec<String> {
        let state = self.shared.lock_state();
        state
            .logs
            .get(id)
            .map(LogBuffer::snapshot)
            .unwrap_or_default()
    }

    /// Lines recorded after the first `seen` of the current run, and the new
    /// total to pass next time.
    pub fn logs_after(&self, id: &str, seen: u64) -> (Vec<String>, u64) {
        let state = self.shared.lock_state();
        match state.logs.get(id) {
            Some(buffer) => (buffer.lines_after(seen), buffer.pushed()),
            None => (Vec::new(), 0),
        }
    }

    /// Every entry, reconciled, oldest first.
    pub fn list(&self) -> Vec<EntrySnapshot> {
        let mut state = self.shared.lock_state();
        let probe = self.shared.probe();
        let mut changed = false;
        {
            let State {
                entries, handles, ..
            } = &mut *state;
            for (id, record) in entries.iter_mut() {
                let before = record.clone();
                reconcile(id, record, handles, &probe);
                changed |= *record != before;
            }
        }
        if changed {
            self.shared.persist_quietly(&state, "*");
        }

        let mut snapshots: Vec<EntrySnapshot> = state
            .entries
            .iter()
            .map(|(id, record)| EntrySnapshot::new(id, record))
            .collect();
        snapshots.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id)));
        snapshots
    }

    /// Requirement lines from the entry's dependency manifest, if present.
    pub fn dependencies(&self, id: &str) -> Result<Option<Vec<String>>> {
        let dir = self.entry_dir(id)?;
        project::read_dependencies(&dir, &self.shared.config.dependency_manifest).map_err(|e| {
            SupervisorError::Project(format!(
                "failed to read {}: {e}",
                self.shared.config.dependency_manifest
            ))
        })
    }

    /// Installs the entry's dependencies with the configured installer.
    ///
    /// Runs without holding the registry lock.
    pub fn install_dependencies(&self, id: &str) -> Result<InstallReport> {
        let dir = self.entry_dir(id)?;
        let config = &self.shared.config;
        if project::read_dependencies(&dir, &config.dependency_manifest)
            .ok()
            .flatten()
            .is_none()
        {
            return Err(SupervisorError::Project(format!(
                "No {} found",
                config.dependency_manifest
            )));
        }
        let installer = config.installer_for(&dir);
        project::install_dependencies(
            &dir,
            &installer,
            &config.installer_args,
            &config.dependency_manifest,
        )
        .map_err(|e| SupervisorError::Project(format!("Error: {e}")))
    }

    /// Known documentation, configuration and dependency files of an entry.
    pub fn project_files(&self, id: &str) -> Result<ProjectFiles> {
        let dir = self.entry_dir(id)?;
        Ok(project::list_files(&dir))
    }

    /// Reads a text file from inside the entry directory.
    pub fn file_content(&self, id: &str, file: impl AsRef<Path>) -> Result<String> {
        let dir = self.entry_dir(id)?;
        project::read_contained_file(&dir, file.as_ref()).map_err(SupervisorError::Project)
    }

    fn entry_dir(&self, id: &str) -> Result<PathBuf> {
        self.shared
            .lock_state()
            .entries
            .get(id)
            .map(|r| r.path.clone())
            .ok_or_else(|| SupervisorError::NotFound(id.to_string()))
    }

    fn gate(&self, id: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(id.to_string()).or_default())
    }
}
