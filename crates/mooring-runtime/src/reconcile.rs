//! Derives an entry's effective status from handles and the OS.
//!
//! Nothing here takes the registry lock; callers already hold it.

use std::collections::HashMap;
use std::path::Path;

use crate::handle::ProcessHandle;
use crate::os::ProcessTable;
use crate::store::{EntryRecord, Status};

/// OS view used to validate remembered pids.
pub(crate) struct Probe<'a> {
    pub table: &'a dyn ProcessTable,
    /// Program name a remembered pid must carry.
    pub runtime: &'a str,
}

/// Reconciles one entry in place and returns its status.
///
/// A held handle is authoritative. Without one, a remembered pid is trusted
/// only when the process is alive and its program name matches the runtime.
/// Exited handles are released and stale pids cleared.
pub(crate) fn reconcile(
    id: &str,
    record: &mut EntryRecord,
    handles: &mut HashMap<String, ProcessHandle>,
    probe: &Probe<'_>,
) -> Status {
    if let Some(handle) = handles.get_mut(id) {
        if !handle.has_exited() {
            record.pid = Some(handle.pid());
            record.status = Status::Running;
            return Status::Running;
        }
        let pid = handle.pid();
        handles.remove(id);
        tracing::debug!(id, pid, "released handle of exited child");
        record.pid = None;
        record.status = Status::Stopped;
        return Status::Stopped;
    }

    if let Some(pid) = record.pid {
        if probe.table.is_alive(pid) {
            match probe.table.program_name(pid) {
                Some(name) if identity_matches(&name, probe.runtime) => {
                    record.status = Status::Running;
                    return Status::Running;
                }
                name => {
                    tracing::debug!(id, pid, ?name, "remembered pid now belongs to another program");
                }
            }
        } else {
            tracing::debug!(id, pid, "remembered pid is gone");
        }
        record.pid = None;
        record.status = Status::Stopped;
        return Status::Stopped;
    }

    if record.status == Status::Running {
        record.status = Status::Stopped;
    }
    record.status
}

/// Checks a live process's program name against the configured runtime.
pub(crate) fn identity_matches(program_name: &str, runtime: &str) -> bool {
    let expected = Path::new(runtime)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    !expected.is_empty() && program_name.to_lowercase().contains(&expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::testing::FakeTable;
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(status: Status, pid: Option<u32>) -> EntryRecord {
        EntryRecord {
            name: "demo".to_string(),
            path: PathBuf::from("/tmp/demo"),
            entry_point: "main.py".to_string(),
            port: 5001,
            status,
            added_at: Utc::now(),
            pid,
        }
    }

    #[test]
    fn live_matching_pid_is_running() {
        let table = FakeTable::with(4242, "python3");
        let probe = Probe {
            table: &table,
            runtime: "python",
        };
        let mut rec = record(Status::Running, Some(4242));
        let status = reconcile("x", &mut rec, &mut HashMap::new(), &probe);
        assert_eq!(status, Status::Running);
        assert_eq!(rec.pid, Some(4242));
    }

    #[test]
    fn dead_pid_is_cleared() {
        let table = FakeTable::default();
        let probe = Probe {
            table: &table,
            runtime: "python",
        };
        let mut rec = record(Status::Running, Some(4242));
        let status = reconcile("x", &mut rec, &mut HashMap::new(), &probe);
        assert_eq!(status, Status::Stopped);
        assert_eq!(rec.pid, None);
        assert_eq!(rec.status, Status::Stopped);
    }

    #[test]
    fn reused_pid_is_rejected() {
        let table = FakeTable::with(4242, "postgres");
        let probe = Probe {
            table: &table,
            runtime: "python",
        };
        let mut rec = record(Status::Running, Some(4242));
        let status = reconcile("x", &mut rec, &mut HashMap::new(), &probe);
        assert_eq!(status, Status::Stopped);
        assert_eq!(rec.pid, None);
    }

    #[test]
    fn error_status_is_sticky_without_process() {
        let table = FakeTable::default();
        let probe = Probe {
            table: &table,
            runtime: "python",
        };
        let mut rec = record(Status::Error, None);
        assert_eq!(
            reconcile("x", &mut rec, &mut HashMap::new(), &probe),
            Status::Error
        );
        let mut rec = record(Status::Running, None);
        assert_eq!(
            reconcile("x", &mut rec, &mut HashMap::new(), &probe),
            Status::Stopped
        );
    }

    #[test]
    fn identity_uses_runtime_basename() {
        assert!(identity_matches("python3.12", "python"));
        assert!(identity_matches("Python", "/opt/venv/bin/python"));
        assert!(!identity_matches("sleep", "sh"));
        assert!(!identity_matches("python", ""));
    }

    #[cfg(unix)]
    #[test]
    fn exited_handle_is_released() {
        use crate::handle::{LaunchSpec, ProcessHandle};
        use crate::os::SystemProcessTable;
        use std::collections::BTreeMap;
        use std::time::{Duration, Instant};

        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("main.sh"), "exit 0\n").unwrap();
        let sh = PathBuf::from("sh");
        let env = BTreeMap::new();
        let (handle, _streams) = ProcessHandle::spawn(&LaunchSpec {
            interpreter: &sh,
            working_dir: tmp.path(),
            entry_point: "main.sh",
            env: &env,
        })
        .unwrap();
        let mut handles = HashMap::new();
        let mut rec = record(Status::Running, Some(handle.pid()));
        handles.insert("x".to_string(), handle);

        let probe = Probe {
            table: &SystemProcessTable,
            runtime: "sh",
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        while reconcile("x", &mut rec, &mut handles, &probe) == Status::Running {
            assert!(Instant::now() < deadline, "child never exited");
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(handles.is_empty());
        assert_eq!(rec.pid, None);
        assert_eq!(rec.status, Status::Stopped);
    }
}
