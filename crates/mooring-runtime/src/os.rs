//! Access to the OS process table.

#[cfg(target_os = "linux")]
use std::fs;
use std::io;
#[cfg(target_os = "linux")]
use std::path::Path;
#[cfg(unix)]
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_SETTLE: Duration = Duration::from_secs(2);

/// Signal sent when stopping a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Graceful termination request (SIGTERM).
    Terminate,
    /// Forced kill (SIGKILL).
    Kill,
}

/// Result of delivering a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No such process; it already exited.
    Gone,
}

/// Queries and signals processes by pid.
///
/// Pids are weak references: callers must pair a liveness check with
/// [`ProcessTable::program_name`] before trusting a pid they did not spawn
/// in this process.
pub trait ProcessTable: Send + Sync {
    /// Returns whether a process exists and is not a zombie.
    fn is_alive(&self, pid: u32) -> bool;

    /// Returns the short program name of a live process.
    fn program_name(&self, pid: u32) -> Option<String>;

    fn signal(&self, pid: u32, signal: StopSignal) -> io::Result<Delivery>;

    /// Signals the process group led by `pid`.
    ///
    /// Tables without group support report `Gone`, which sends callers of
    /// [`signal_tree`] back to [`ProcessTable::signal`].
    fn signal_group(&self, _pid: u32, _signal: StopSignal) -> io::Result<Delivery> {
        Ok(Delivery::Gone)
    }
}

/// [`ProcessTable`] backed by the running system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessTable;

#[cfg(unix)]
impl ProcessTable for SystemProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        if let Some(alive) = proc_is_alive(pid) {
            return alive;
        }
        let pid_str = pid.to_string();
        if let Ok(out) = Command::new("ps")
            .args(["-o", "stat=", "-p", &pid_str])
            .output()
        {
            if !out.status.success() {
                return false;
            }
            let stat = String::from_utf8_lossy(&out.stdout).trim().to_string();
            // Zombies are dead for supervision purposes.
            return !stat.is_empty() && !stat.starts_with('Z');
        }

        match to_nix_pid(pid) {
            Ok(nix_pid) => nix::sys::signal::kill(nix_pid, None).is_ok(),
            Err(_) => false,
        }
    }

    fn program_name(&self, pid: u32) -> Option<String> {
        if pid == 0 {
            return None;
        }
        if let Some(name) = proc_program_name(pid) {
            return Some(name);
        }
        let out = Command::new("ps")
            .args(["-o", "comm=", "-p", &pid.to_string()])
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let comm = String::from_utf8_lossy(&out.stdout).trim().to_string();
        // BSD ps reports the full executable path.
        let name = comm.rsplit('/').next().unwrap_or_default().to_string();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    fn signal(&self, pid: u32, signal: StopSignal) -> io::Result<Delivery> {
        use nix::errno::Errno;
        use nix::sys::signal::kill;

        match kill(to_nix_pid(pid)?, to_nix_signal(signal)) {
            Ok(()) => Ok(Delivery::Delivered),
            Err(Errno::ESRCH) => Ok(Delivery::Gone),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    fn signal_group(&self, pid: u32, signal: StopSignal) -> io::Result<Delivery> {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;

        match killpg(to_nix_pid(pid)?, to_nix_signal(signal)) {
            Ok(()) => Ok(Delivery::Delivered),
            Err(Errno::ESRCH) => Ok(Delivery::Gone),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

#[cfg(unix)]
fn to_nix_signal(signal: StopSignal) -> nix::sys::signal::Signal {
    match signal {
        StopSignal::Terminate => nix::sys::signal::Signal::SIGTERM,
        StopSignal::Kill => nix::sys::signal::Signal::SIGKILL,
    }
}

/// Liveness from `/proc/<pid>/stat`, or `None` when procfs is unavailable.
#[cfg(target_os = "linux")]
fn proc_is_alive(pid: u32) -> Option<bool> {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        // The command name may contain spaces and parens; the state follows the last ')'.
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .map(|state| state != 'Z' && state != 'X'),
        Err(e) if e.kind() == io::ErrorKind::NotFound && Path::new("/proc/self").exists() => {
            Some(false)
        }
        Err(_) => None,
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn proc_is_alive(_pid: u32) -> Option<bool> {
    None
}

#[cfg(target_os = "linux")]
fn proc_program_name(pid: u32) -> Option<String> {
    let comm = fs::read_to_string(format!("/proc/{pid}/comm")).ok()?;
    let name = comm.trim_end_matches('\n');
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn proc_program_name(_pid: u32) -> Option<String> {
    None
}

#[cfg(unix)]
fn to_nix_pid(pid: u32) -> io::Result<nix::unistd::Pid> {
    // Pid 0 and negative values address process groups.
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(nix::unistd::Pid::from_raw(raw)),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal pid {pid}"),
        )),
    }
}

#[cfg(not(unix))]
impl ProcessTable for SystemProcessTable {
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }

    fn program_name(&self, _pid: u32) -> Option<String> {
        None
    }

    fn signal(&self, _pid: u32, _signal: StopSignal) -> io::Result<Delivery> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "signalling processes by pid is not supported on this platform",
        ))
    }
}

/// Stops a process we hold no handle for: SIGTERM, wait up to `grace`,
/// then SIGKILL.
///
/// A process that is already gone counts as stopped. Fails only when both
/// signals are refused or the process survives the kill.
pub fn terminate_pid(table: &dyn ProcessTable, pid: u32, grace: Duration) -> io::Result<()> {
    let graceful = signal_tree(table, pid, StopSignal::Terminate);
    match graceful {
        Ok(Delivery::Gone) => {
            sweep_group(table, pid);
            return Ok(());
        }
        Ok(Delivery::Delivered) => {
            if wait_for_exit(table, pid, grace) {
                sweep_group(table, pid);
                return Ok(());
            }
        }
        Err(ref e) => {
            tracing::warn!(pid, error = %e, "graceful termination refused, escalating");
        }
    }

    match signal_tree(table, pid, StopSignal::Kill) {
        Ok(Delivery::Gone) => Ok(()),
        Ok(Delivery::Delivered) => {
            if wait_for_exit(table, pid, KILL_SETTLE) {
                sweep_group(table, pid);
                Ok(())
            } else {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("process {pid} survived SIGKILL"),
                ))
            }
        }
        Err(e) => Err(io::Error::new(
            e.kind(),
            format!("failed to force terminate process {pid}: {e}"),
        )),
    }
}

/// Signals the group led by `pid`, or `pid` alone when it leads no group.
///
/// Launched children lead their own group, so descendants that inherited
/// the output pipes receive the same signal.
pub fn signal_tree(table: &dyn ProcessTable, pid: u32, signal: StopSignal) -> io::Result<Delivery> {
    match table.signal_group(pid, signal)? {
        Delivery::Delivered => Ok(Delivery::Delivered),
        Delivery::Gone => table.signal(pid, signal),
    }
}

/// Kills what remains of the group once its leader `pid` has exited.
///
/// Only the group is addressed, never the bare pid, so a recycled pid is
/// left alone.
pub fn sweep_group(table: &dyn ProcessTable, pid: u32) {
    match table.signal_group(pid, StopSignal::Kill) {
        Ok(Delivery::Delivered) => tracing::info!(pid, "killed leftover processes of group"),
        Ok(Delivery::Gone) => {}
        Err(e) => tracing::warn!(pid, error = %e, "failed to kill leftover processes of group"),
    }
}

/// Polls until the process is gone or `timeout` elapses.
pub fn wait_for_exit(table: &dyn ProcessTable, pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !table.is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted process table: pid -> program name.
    #[derive(Debug, Default)]
    pub(crate) struct FakeTable {
        procs: Mutex<HashMap<u32, String>>,
        pub(crate) refuse_signals: bool,
    }

    impl FakeTable {
        pub(crate) fn with(pid: u32, name: &str) -> Self {
            let table = FakeTable::default();
            table.insert(pid, name);
            table
        }

        pub(crate) fn insert(&self, pid: u32, name: &str) {
            self.procs.lock().unwrap().insert(pid, name.to_string());
        }
    }

    impl ProcessTable for FakeTable {
        fn is_alive(&self, pid: u32) -> bool {
            self.procs.lock().unwrap().contains_key(&pid)
        }

        fn program_name(&self, pid: u32) -> Option<String> {
            self.procs.lock().unwrap().get(&pid).cloned()
        }

        fn signal(&self, pid: u32, _signal: StopSignal) -> io::Result<Delivery> {
            if self.refuse_signals {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            match self.procs.lock().unwrap().remove(&pid) {
                Some(_) => Ok(Delivery::Delivered),
                None => Ok(Delivery::Gone),
            }
        }
    }
}
