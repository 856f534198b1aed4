//! Owned handle on one launched child process.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::os::{signal_tree, sweep_group, Delivery, ProcessTable, StopSignal};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Everything needed to launch one entry.
#[derive(Debug, Clone)]
pub struct LaunchSpec<'a> {
    pub interpreter: &'a Path,
    pub working_dir: &'a Path,
    pub entry_point: &'a str,
    pub env: &'a BTreeMap<String, String>,
}

/// Output pipes taken from a freshly spawned child.
#[derive(Debug)]
pub struct OutputStreams {
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// A child process launched by this supervisor instance.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
}

impl ProcessHandle {
    /// Launches `<interpreter> <working_dir>/<entry_point>` with piped output.
    pub fn spawn(spec: &LaunchSpec<'_>) -> io::Result<(Self, OutputStreams)> {
        if !spec.working_dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("working directory {} not found", spec.working_dir.display()),
            ));
        }
        let entry_path = spec.working_dir.join(spec.entry_point);
        if !entry_path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("entry point {} not found", entry_path.display()),
            ));
        }

        let mut command = Command::new(spec.interpreter);
        command
            .arg(&entry_path)
            .current_dir(spec.working_dir)
            .envs(spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // The child leads its own group so a stop reaches its descendants.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let mut child = command
            .spawn()
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!(
                        "failed to spawn {}: {e}",
                        spec.interpreter.display()
                    ),
                )
            })?;

        let streams = OutputStreams {
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };
        let pid = child.id();
        Ok((ProcessHandle { child, pid }, streams))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Polls the child without blocking. Exited children are reaped.
    pub fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(pid = self.pid, %status, "child exited");
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(pid = self.pid, error = %e, "failed to poll child, treating as exited");
                true
            }
        }
    }

    /// Sends SIGTERM to the child's group, waits up to `grace`, then
    /// force-kills and reaps. Descendants left behind by the child are killed
    /// once it is gone.
    ///
    /// A child that has already exited is a successful stop.
    pub fn terminate(&mut self, table: &dyn ProcessTable, grace: Duration) -> io::Result<()> {
        if self.has_exited() {
            sweep_group(table, self.pid);
            return Ok(());
        }

        match signal_tree(table, self.pid, StopSignal::Terminate) {
            Ok(Delivery::Gone) => {
                let _ = self.child.wait();
                sweep_group(table, self.pid);
                return Ok(());
            }
            Ok(Delivery::Delivered) => {
                if self.wait_timeout(grace) {
                    sweep_group(table, self.pid);
                    return Ok(());
                }
                tracing::info!(pid = self.pid, "child ignored SIGTERM, killing");
            }
            Err(e) => {
                tracing::warn!(pid = self.pid, error = %e, "graceful termination refused, killing");
            }
        }

        if let Err(e) = table.signal_group(self.pid, StopSignal::Kill) {
            tracing::debug!(pid = self.pid, error = %e, "group kill refused");
        }
        match self.child.kill() {
            Ok(()) => {}
            // Already reaped between the poll and the kill.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                sweep_group(table, self.pid);
                return Ok(());
            }
            Err(e) => {
                return Err(io::Error::new(
                    e.kind(),
                    format!("failed to force terminate process {}: {e}", self.pid),
                ))
            }
        }
        self.child.wait()?;
        sweep_group(table, self.pid);
        Ok(())
    }

    fn wait_timeout(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_exited() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::os::SystemProcessTable;
    use std::fs;
    use std::io::Read;
    use std::path::PathBuf;

    fn spec_in<'a>(
        dir: &'a Path,
        entry: &'a str,
        interpreter: &'a Path,
        env: &'a BTreeMap<String, String>,
    ) -> LaunchSpec<'a> {
        LaunchSpec {
            interpreter,
            working_dir: dir,
            entry_point: entry,
            env,
        }
    }

    #[test]
    fn spawn_captures_stdout_and_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("main.sh"), "echo out\necho err >&2\n").unwrap();
        let sh = PathBuf::from("sh");
        let env = BTreeMap::new();
        let (mut handle, streams) =
            ProcessHandle::spawn(&spec_in(tmp.path(), "main.sh", &sh, &env)).unwrap();

        let mut out = String::new();
        streams.stdout.unwrap().read_to_string(&mut out).unwrap();
        let mut err = String::new();
        streams.stderr.unwrap().read_to_string(&mut err).unwrap();
        assert_eq!(out.trim(), "out");
        assert_eq!(err.trim(), "err");

        assert!(handle.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn spawn_runs_in_working_dir_with_env() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("main.sh"), "pwd\necho \"$GREETING\"\n").unwrap();
        let sh = PathBuf::from("sh");
        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "ahoy".to_string());
        let (_handle, streams) =
            ProcessHandle::spawn(&spec_in(tmp.path(), "main.sh", &sh, &env)).unwrap();

        let mut out = String::new();
        streams.stdout.unwrap().read_to_string(&mut out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        let expected = fs::canonicalize(tmp.path()).unwrap();
        assert_eq!(fs::canonicalize(lines[0]).unwrap(), expected);
        assert_eq!(lines[1], "ahoy");
    }

    #[test]
    fn missing_entry_point_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let sh = PathBuf::from("sh");
        let env = BTreeMap::new();
        let err = ProcessHandle::spawn(&spec_in(tmp.path(), "missing.sh", &sh, &env)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn missing_interpreter_fails_to_spawn() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("main.sh"), "echo hi\n").unwrap();
        let interpreter = PathBuf::from("mooring-no-such-interpreter");
        let env = BTreeMap::new();
        let err =
            ProcessHandle::spawn(&spec_in(tmp.path(), "main.sh", &interpreter, &env)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn terminate_escalates_when_term_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("main.sh"),
            "trap '' TERM\nwhile true; do sleep 1; done\n",
        )
        .unwrap();
        let sh = PathBuf::from("sh");
        let env = BTreeMap::new();
        let (mut handle, _streams) =
            ProcessHandle::spawn(&spec_in(tmp.path(), "main.sh", &sh, &env)).unwrap();
        thread::sleep(Duration::from_millis(100));

        handle
            .terminate(&SystemProcessTable, Duration::from_millis(300))
            .unwrap();
        assert!(handle.has_exited());
        assert!(!SystemProcessTable.is_alive(handle.pid()));
    }

    #[test]
    fn terminate_reaches_descendants() {
        use crate::os::wait_for_exit;
        use std::io::{BufRead, BufReader};

        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("main.sh"), "sleep 300 &\necho $!\nwait\n").unwrap();
        let sh = PathBuf::from("sh");
        let env = BTreeMap::new();
        let (mut handle, streams) =
            ProcessHandle::spawn(&spec_in(tmp.path(), "main.sh", &sh, &env)).unwrap();
        let mut line = String::new();
        BufReader::new(streams.stdout.unwrap())
            .read_line(&mut line)
            .unwrap();
        let descendant: u32 = line.trim().parse().unwrap();
        assert!(SystemProcessTable.is_alive(descendant));

        handle
            .terminate(&SystemProcessTable, Duration::from_secs(1))
            .unwrap();
        assert!(wait_for_exit(
            &SystemProcessTable,
            descendant,
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn terminate_after_exit_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("main.sh"), "exit 0\n").unwrap();
        let sh = PathBuf::from("sh");
        let env = BTreeMap::new();
        let (mut handle, _streams) =
            ProcessHandle::spawn(&spec_in(tmp.path(), "main.sh", &sh, &env)).unwrap();
        assert!(handle.wait_timeout(Duration::from_secs(5)));
        handle
            .terminate(&SystemProcessTable, Duration::from_secs(1))
            .unwrap();
    }
}
