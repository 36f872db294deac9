//! Process supervision (spec §4.5): PID tracking, crash detection, and the
//! restart algorithm. Grounded on the teacher's `QuarantineManager`
//! (`crates/resource/src/quarantine.rs`) for the state-machine/backoff
//! shape, adapted from "is this resource too unhealthy to keep retrying"
//! to "is this one process too crash-prone to keep restarting".

use std::path::Path;
use std::time::Duration;

use nebula_error::{NebulaError, Result};
use nebula_resilience::ExponentialBackoff;
use nebula_system::ProcessTable;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::nebula_cli::NebulaCli;
use crate::paths::StatePaths;

/// Mirrors spec §4.5's `Stopped → Starting → Running → Stopping → Stopped`
/// cycle, with `Failed` as the sink entered after exhausting restart
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Drives one Nebula process: liveness checks, orphan adoption, and the
/// validate-then-kill-then-spawn restart sequence.
pub struct Supervisor {
    cli: NebulaCli,
    paths: StatePaths,
    restart_init_timeout: Duration,
    backoff: ExponentialBackoff,
    state: SupervisorState,
}

impl Supervisor {
    #[must_use]
    pub fn new(cli: NebulaCli, paths: StatePaths, restart_init_timeout: Duration) -> Self {
        Self {
            cli,
            paths,
            restart_init_timeout,
            backoff: ExponentialBackoff::supervisor_restart(),
            state: SupervisorState::Stopped,
        }
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// PID from the pidfile if it's still alive, else a scan for an
    /// orphaned `nebula` process left running by a previous agent instance
    /// (spec §4.5's orphan-adoption path).
    pub fn current_pid(&self, processes: &mut ProcessTable) -> Option<u32> {
        processes.refresh();
        if let Ok(contents) = std::fs::read_to_string(self.paths.pidfile()) {
            if let Ok(pid) = contents.trim().parse::<u32>() {
                if processes.is_running(pid) {
                    return Some(pid);
                }
            }
            let _ = std::fs::remove_file(self.paths.pidfile());
        }

        processes.find_by_name("nebula").into_keys().find(|&pid| {
            processes.get(pid).is_some_and(|p| {
                p.cmd.iter().any(|arg| arg.contains(&self.paths.config_path().to_string_lossy().into_owned()))
            })
        })
    }

    #[must_use]
    pub fn is_running(&self, processes: &mut ProcessTable) -> bool {
        self.current_pid(processes).is_some()
    }

    async fn stop_current(&self, pid: u32) {
        info!(pid, "stopping nebula process");
        send_signal(pid, Signal::Term);
        sleep(Duration::from_secs(2)).await;
        if process_alive(pid) {
            warn!(pid, "process still running, sending SIGKILL");
            send_signal(pid, Signal::Kill);
        }
        let _ = std::fs::remove_file(self.paths.pidfile());
    }

    /// The full restart sequence: validate config, stop whatever's running,
    /// spawn a new process detached, and poll for it to come up. Retries up
    /// to `max_attempts` times with `ExponentialBackoff::supervisor_restart()`
    /// between failures.
    pub async fn restart(&mut self, max_attempts: u32, processes: &mut ProcessTable) -> Result<u32> {
        self.cli.validate_config(self.paths.config_path()).await.map_err(|err| {
            warn!(%err, "skipping restart due to invalid config");
            err
        })?;

        self.state = SupervisorState::Stopping;
        for attempt in 0..max_attempts {
            if let Some(pid) = self.current_pid(processes) {
                self.stop_current(pid).await;
            }

            self.state = SupervisorState::Starting;
            let child = self.cli.spawn_detached(self.paths.config_path())?;
            let Some(spawned_pid) = child.id() else {
                self.state = SupervisorState::Failed;
                return Err(NebulaError::external("spawned nebula process reported no PID"));
            };
            std::fs::write(self.paths.pidfile(), spawned_pid.to_string())?;
            info!(pid = spawned_pid, attempt, "started nebula process");

            if self.wait_for_initialization(spawned_pid, processes).await {
                self.state = SupervisorState::Running;
                return Ok(spawned_pid);
            }

            warn!(attempt, "nebula did not reach running state within the timeout");
            if attempt + 1 < max_attempts {
                self.backoff.wait(attempt).await;
            }
        }

        self.state = SupervisorState::Failed;
        error!(max_attempts, "ALERT: failed to restart nebula after exhausting all attempts");
        Err(NebulaError::external("exhausted restart attempts"))
    }

    async fn wait_for_initialization(&self, expected_pid: u32, processes: &mut ProcessTable) -> bool {
        let deadline = tokio::time::Instant::now() + self.restart_init_timeout;
        while tokio::time::Instant::now() < deadline {
            sleep(Duration::from_secs(1)).await;
            processes.refresh();
            if processes.is_running(expected_pid) {
                return true;
            }
        }
        false
    }
}

enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) {
    let sig = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: kill(2) on a PID we read from our own pidfile or discovered
    // via the process table; signal and value are both kernel-defined.
    unsafe {
        libc::kill(pid as libc::pid_t, sig);
    }
}

#[cfg(windows)]
fn send_signal(pid: u32, _signal: Signal) {
    // Windows has no SIGTERM/SIGKILL distinction for an arbitrary process;
    // taskkill /F is the closest equivalent to both steps.
    let _ = std::process::Command::new("taskkill").args(["/PID", &pid.to_string(), "/F"]).status();
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs no action, only an existence/permission check.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(windows)]
fn process_alive(pid: u32) -> bool {
    let mut processes = ProcessTable::new();
    processes.refresh();
    processes.is_running(pid)
}
