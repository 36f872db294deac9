//! The background monitor loop used in `--monitor` mode (spec §4.5): polls
//! process liveness every `process_check_interval`, runs a periodic health
//! check every `health_check_interval`, and attempts recovery through the
//! supervisor on crash -- gated by the same consecutive-failure ceiling the
//! restart algorithm uses, to avoid a crash-loop storm.

use std::time::Duration;

use chrono::Utc;
use nebula_system::ProcessTable;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::metrics::SharedMetrics;
use crate::paths::StatePaths;
use crate::supervisor::Supervisor;

/// How long the monitor backs off after hitting the consecutive-failure
/// ceiling, before re-evaluating (spec §4.5).
const ALERT_COOLDOWN: Duration = Duration::from_secs(300);

/// Runs forever, restarting Nebula on crash and on failed health checks.
/// Intended to be spawned alongside the reconcile loop in `--monitor` mode;
/// the two share `metrics` through the same `SharedMetrics` handle, so a
/// crash recorded here and a restart recorded by the reconcile loop never
/// clobber each other's read-modify-write.
pub async fn run(config: &AgentConfig, paths: &StatePaths, supervisor: &mut Supervisor, metrics: &SharedMetrics) {
    info!(
        process_check_interval = ?config.process_check_interval,
        health_check_interval = ?config.health_check_interval,
        "starting process monitor"
    );

    let mut processes = ProcessTable::new();
    let mut last_health_check = tokio::time::Instant::now();

    loop {
        if !supervisor.is_running(&mut processes) {
            metrics
                .update(|m| {
                    m.crash_count += 1;
                    m.last_crash_time = Some(Utc::now());
                    m.consecutive_failures += 1;
                })
                .await;
            let consecutive_failures = metrics.snapshot().await.consecutive_failures;
            error!(consecutive_failures, "crash detected");

            if consecutive_failures >= config.max_restart_attempts {
                error!(
                    consecutive_failures,
                    "ALERT: too many consecutive failures, administrator intervention required"
                );
                sleep(ALERT_COOLDOWN).await;
                continue;
            }

            match supervisor.restart(config.max_restart_attempts, &mut processes).await {
                Ok(pid) => {
                    info!(pid, "recovery successful");
                    metrics
                        .update(|m| {
                            m.restart_count += 1;
                            m.consecutive_failures = 0;
                            m.last_successful_restart = Some(Utc::now());
                        })
                        .await;
                },
                Err(err) => {
                    metrics.update(|m| m.consecutive_failures += 1).await;
                    warn!(%err, "recovery failed");
                },
            }
        } else if last_health_check.elapsed() >= config.health_check_interval {
            last_health_check = tokio::time::Instant::now();
            // Process liveness is the only health signal this system has
            // (spec §4.5's `checkNebulaHealth` is deliberately minimal);
            // deeper checks (lighthouse handshake state) are a known gap,
            // same as the agent this was modeled on.
        }

        sleep(config.process_check_interval).await;
    }
}
