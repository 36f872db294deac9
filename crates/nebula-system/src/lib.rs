//! Cross-platform process introspection used by the node agent's supervisor
//! to detect a crashed Nebula process and to adopt an orphaned one left
//! running from a previous agent instance.

use std::collections::HashMap;

use sysinfo::{Pid, System};
use thiserror::Error;

/// Errors from process introspection.
#[derive(Debug, Error)]
pub enum SystemError {
    /// The requested PID is not currently running.
    #[error("process {0} is not running")]
    NotRunning(u32),
}

/// A snapshot of one running process, as much as the supervisor needs.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// OS process ID.
    pub pid: u32,
    /// Executable name, as reported by the OS (not the full path).
    pub name: String,
    /// Command-line arguments, if the OS exposes them to this process.
    pub cmd: Vec<String>,
}

/// Thin wrapper over `sysinfo::System`, refreshed on each query.
///
/// Each call refreshes only the process table, not the whole system (CPU,
/// memory, disks) -- the supervisor only ever needs liveness and argv.
pub struct ProcessTable {
    system: System,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    /// Create a table with an empty initial snapshot; call [`refresh`](Self::refresh)
    /// before querying.
    #[must_use]
    pub fn new() -> Self {
        Self { system: System::new() }
    }

    /// Re-read the OS process table.
    pub fn refresh(&mut self) {
        self.system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    }

    /// Whether a PID currently corresponds to a live process.
    #[must_use]
    pub fn is_running(&self, pid: u32) -> bool {
        self.system.process(Pid::from_u32(pid)).is_some()
    }

    /// Look up one process by PID.
    #[must_use]
    pub fn get(&self, pid: u32) -> Option<ProcessInfo> {
        self.system.process(Pid::from_u32(pid)).map(|p| ProcessInfo {
            pid,
            name: p.name().to_string_lossy().into_owned(),
            cmd: p.cmd().iter().map(|s| s.to_string_lossy().into_owned()).collect(),
        })
    }

    /// Find all processes whose executable name matches exactly, keyed by
    /// PID. Used by the supervisor's orphan-adoption path: on startup, look
    /// for a still-running `nebula` process started by a previous agent
    /// instance before spawning a new one.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> HashMap<u32, ProcessInfo> {
        self.system
            .processes()
            .iter()
            .filter(|(_, p)| p.name().to_string_lossy() == name)
            .map(|(pid, p)| {
                let info = ProcessInfo {
                    pid: pid.as_u32(),
                    name: p.name().to_string_lossy().into_owned(),
                    cmd: p.cmd().iter().map(|s| s.to_string_lossy().into_owned()).collect(),
                };
                (pid.as_u32(), info)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_running() {
        let mut table = ProcessTable::new();
        table.refresh();
        let pid = std::process::id();
        assert!(table.is_running(pid));
        assert!(table.get(pid).is_some());
    }

    #[test]
    fn unused_pid_is_not_running() {
        let mut table = ProcessTable::new();
        table.refresh();
        // PID 0 is reserved on every platform sysinfo supports and will
        // never show up in the process table.
        assert!(!table.is_running(0));
    }
}
