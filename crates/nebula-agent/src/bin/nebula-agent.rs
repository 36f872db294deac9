//! The node agent binary: `--once` (one reconcile pass), `--loop` (poll
//! every `POLL_INTERVAL_HOURS`), or `--monitor` (poll plus a background
//! crash-recovery loop, spec §4.5's recommended mode).

use std::time::Duration;

use nebula_agent::config::AgentConfig;
use nebula_agent::metrics::SharedMetrics;
use nebula_agent::nebula_cli::NebulaCli;
use nebula_agent::supervisor::Supervisor;
use nebula_agent::{cycle, monitor};
use nebula_log::{LogFormat, LoggerBuilder};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once { restart_on_change: bool },
    Loop,
    Monitor,
}

fn parse_mode() -> Mode {
    mode_from_args(std::env::args())
}

fn mode_from_args(args: impl Iterator<Item = String>) -> Mode {
    let args: Vec<String> = args.collect();
    let has = |flag: &str| args.iter().any(|a| a == flag);
    if has("--monitor") {
        Mode::Monitor
    } else if has("--loop") {
        Mode::Loop
    } else {
        Mode::Once { restart_on_change: has("--restart") }
    }
}


async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received, draining the current cycle before exit");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    LoggerBuilder::new().default_filter("info").format(LogFormat::Pretty).init();
    info!(pid = std::process::id(), "nebula-agent starting");

    let config = AgentConfig::load()?;
    let paths = config.paths();
    let mode = parse_mode();

    let cert_cli_path = std::env::var("NEBULA_CERT_CLI_PATH").unwrap_or_else(|_| "nebula-cert".to_string());
    let nebula_cli_path = std::env::var("NEBULA_CLI_PATH").unwrap_or_else(|_| "nebula".to_string());
    let mut supervisor =
        Supervisor::new(NebulaCli::new(nebula_cli_path.clone()), paths.clone(), config.restart_init_timeout);
    let metrics = SharedMetrics::load(paths.metrics_file());

    match mode {
        Mode::Once { restart_on_change } => {
            cycle::run_once(
                &config,
                &paths,
                &cert_cli_path,
                &nebula_cli_path,
                &mut supervisor,
                restart_on_change,
                &metrics,
            )
            .await?;
        },
        Mode::Loop => {
            run_poll_loop(&config, &paths, &cert_cli_path, &nebula_cli_path, &mut supervisor, &metrics).await;
        },
        Mode::Monitor => {
            info!("entering monitor mode: process supervision plus resilient recovery");
            if !config.start_nebula {
                warn!("START_NEBULA is false, the monitor loop will not spawn nebula");
            }

            let monitor_config = config.clone();
            let monitor_paths = paths.clone();
            let monitor_nebula_cli = NebulaCli::new(nebula_cli_path.clone());
            let mut monitor_supervisor = Supervisor::new(monitor_nebula_cli, monitor_paths.clone(), config.restart_init_timeout);
            let monitor_metrics = metrics.clone();
            let monitor_handle = tokio::spawn(async move {
                monitor::run(&monitor_config, &monitor_paths, &mut monitor_supervisor, &monitor_metrics).await;
            });

            tokio::select! {
                () = run_poll_loop(&config, &paths, &cert_cli_path, &nebula_cli_path, &mut supervisor, &metrics) => {},
                () = shutdown_signal() => {},
            }
            monitor_handle.abort();
        },
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_poll_loop(
    config: &AgentConfig,
    paths: &nebula_agent::StatePaths,
    cert_cli_path: &str,
    nebula_cli_path: &str,
    supervisor: &mut Supervisor,
    metrics: &SharedMetrics,
) {
    let interval = Duration::from_secs(config.poll_interval_hours * 3600);
    loop {
        tokio::select! {
            result = cycle::run_once(config, paths, cert_cli_path, nebula_cli_path, supervisor, true, metrics) => {
                if let Err(err) = result {
                    error!(%err, "reconcile cycle failed");
                }
            },
            () = shutdown_signal() => return,
        }
        tokio::select! {
            () = tokio::time::sleep(interval) => {},
            () = shutdown_signal() => return,
        }
    }
}
