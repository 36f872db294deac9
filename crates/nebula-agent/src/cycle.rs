//! Orchestrates one full reconcile cycle (spec §4.5 steps 1-6): keypair,
//! optional binary upgrade, config fetch, diff, write, and conditional
//! restart. Used by all three CLI entry modes (`--once`, `--loop`,
//! `--monitor`); the two polling modes just call this repeatedly.

use nebula_cert::CertCli;
use nebula_error::Result;
use tracing::{info, warn};

use crate::client::ControlPlaneClient;
use crate::config::AgentConfig;
use crate::keypair::ensure_keypair;
use crate::metrics::SharedMetrics;
use crate::nebula_cli::NebulaCli;
use crate::paths::StatePaths;
use crate::reconcile::write_config_and_pki;
use crate::supervisor::Supervisor;
use crate::upgrader::{Upgrader, download_url, resolve_arch};

/// Outcome of one cycle, so callers (the CLI, the `--loop` driver) can
/// decide whether to restart and what to log.
#[derive(Debug, Clone, Copy)]
pub struct CycleOutcome {
    pub config_changed: bool,
    pub nebula_upgraded: bool,
}

/// One reconcile pass. `restart_on_change` mirrors the Python agent's
/// `--restart`/loop-mode behavior: when true and either the config changed
/// or the binary was upgraded, the supervisor is asked to restart and, on
/// success, a second fetch confirms the fresh config matches what's now
/// running.
#[allow(clippy::too_many_arguments)]
pub async fn run_once(
    config: &AgentConfig,
    paths: &StatePaths,
    cert_cli_path: &str,
    nebula_cli_path: &str,
    supervisor: &mut Supervisor,
    restart_on_change: bool,
    metrics: &SharedMetrics,
) -> Result<CycleOutcome> {
    let cert_cli = CertCli::new(cert_cli_path);
    let nebula_cli = NebulaCli::new(nebula_cli_path);

    let nebula_upgraded = check_and_update_nebula(config, &nebula_cli).await;

    let keypair = ensure_keypair(paths, &cert_cli).await?;

    let local_nebula_version =
        config.nebula_version_override.clone().or(nebula_cli.version().await).unwrap_or_else(|| "unknown".into());
    let client_version = config.client_version_override.clone().unwrap_or_else(|| env!("CARGO_PKG_VERSION").into());

    let client =
        ControlPlaneClient::new(&config.server_url, config.allow_self_signed_cert, config.config_fetch_timeout)?;
    let fetched = client
        .fetch_config_with_retry(
            &config.client_token,
            &keypair.public_key_pem,
            &client_version,
            &local_nebula_version,
            config.max_fetch_retries,
            &paths.cached_config_file(),
            Some(metrics),
        )
        .await?;

    let config_changed = write_config_and_pki(paths, &fetched)?;
    if !config_changed {
        info!("config unchanged, no restart needed");
    }

    if restart_on_change && (config_changed || nebula_upgraded) {
        info!("coordinated recovery: restarting nebula");
        match restart_and_record(supervisor, config.max_restart_attempts, metrics).await {
            Ok(_pid) => {
                tokio::time::sleep(config.post_restart_wait).await;
                if let Err(err) = refetch_and_reconcile(config, paths, &cert_cli, supervisor, &client, &keypair.public_key_pem, &client_version, &local_nebula_version, metrics).await
                {
                    warn!(%err, "failed to fetch fresh config after restart, continuing with existing config");
                }
            },
            Err(err) => warn!(%err, "failed to restart nebula"),
        }
    }

    Ok(CycleOutcome { config_changed, nebula_upgraded })
}

/// `Supervisor::restart` plus the metrics bookkeeping the Python agent's
/// `restart_nebula_with_backoff` does under its `metrics_lock`: a success
/// resets `consecutive_failures` and bumps `restart_count`, a failure bumps
/// `consecutive_failures`.
async fn restart_and_record(supervisor: &mut Supervisor, max_attempts: u32, metrics: &SharedMetrics) -> Result<u32> {
    let result = supervisor.restart(max_attempts, &mut nebula_system::ProcessTable::new()).await;
    match &result {
        Ok(_) => {
            metrics
                .update(|m| {
                    m.restart_count += 1;
                    m.consecutive_failures = 0;
                    m.last_successful_restart = Some(chrono::Utc::now());
                })
                .await;
        },
        Err(_) => {
            metrics.update(|m| m.consecutive_failures += 1).await;
        },
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn refetch_and_reconcile(
    config: &AgentConfig,
    paths: &StatePaths,
    _cert_cli: &CertCli,
    supervisor: &mut Supervisor,
    client: &ControlPlaneClient,
    public_key_pem: &str,
    client_version: &str,
    nebula_version: &str,
    metrics: &SharedMetrics,
) -> Result<()> {
    info!("fetching fresh config after restart");
    let fresh = client
        .fetch_config_with_retry(
            &config.client_token,
            public_key_pem,
            client_version,
            nebula_version,
            config.max_fetch_retries,
            &paths.cached_config_file(),
            Some(metrics),
        )
        .await?;
    if write_config_and_pki(paths, &fresh)? {
        info!("fresh config differs, restarting again");
        restart_and_record(supervisor, config.max_restart_attempts, metrics).await?;
    }
    Ok(())
}

/// Query the server's target Nebula version and, if it differs from the
/// locally installed one, download and install the matching release.
/// Failures here are logged and treated as "no upgrade performed" -- an
/// unreachable GitHub release must never block the config fetch that
/// follows.
async fn check_and_update_nebula(config: &AgentConfig, nebula_cli: &NebulaCli) -> bool {
    let client = match ControlPlaneClient::new(&config.server_url, config.allow_self_signed_cert, config.config_fetch_timeout)
    {
        Ok(client) => client,
        Err(err) => {
            warn!(%err, "failed to build version-check client");
            return false;
        },
    };

    let server_version = match client.server_nebula_version().await {
        Ok(Some(version)) => version.trim_start_matches('v').to_string(),
        Ok(None) => return false,
        Err(err) => {
            warn!(%err, "nebula version check failed");
            return false;
        },
    };

    let Some(local_version) = nebula_cli.version().await else {
        info!("cannot determine local nebula version, skipping upgrade check");
        return false;
    };
    let local_version = local_version.trim_start_matches('v');
    if local_version == server_version {
        return false;
    }

    info!(local_version, server_version, "nebula version mismatch detected, upgrading");
    let Some(arch) = resolve_arch() else {
        warn!(arch = std::env::consts::ARCH, "unsupported architecture, skipping upgrade");
        return false;
    };
    let url = download_url(&server_version, arch);

    let install_dir = std::env::var("NEBULA_INSTALL_DIR").unwrap_or_else(|_| "/usr/local/bin".to_string());
    let upgrader = match Upgrader::new(config.allow_self_signed_cert, install_dir) {
        Ok(upgrader) => upgrader,
        Err(err) => {
            warn!(%err, "failed to build upgrader client");
            return false;
        },
    };

    match upgrader.upgrade(&url, &server_version).await {
        Ok(installed_version) => {
            info!(installed_version, "nebula upgraded successfully");
            true
        },
        Err(err) => {
            warn!(%err, "failed to upgrade nebula");
            false
        },
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::nebula_cli::NebulaCli;

    fn fake_cert_cli(dir: &std::path::Path) -> String {
        let script = dir.join("fake-nebula-cert.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nwhile [ \"$1\" != \"-out-key\" ]; do shift; done\nshift\nkey=\"$1\"\nshift 2\npub=\"$1\"\necho fake-key > \"$key\"\necho fake-pub > \"$pub\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn a_fresh_fetch_writes_config_without_restarting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/version"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"managed_nebula_version": "0.1.0", "nebula_version": null})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/client/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "config": "listen: {}",
                "client_cert_pem": "cert",
                "ca_chain_pems": ["ca"],
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::new(dir.path(), dir.path().join("config.yml"));
        let cert_cli_path = fake_cert_cli(dir.path());

        let config = AgentConfig {
            server_url: server.uri(),
            client_token: "token".into(),
            allow_self_signed_cert: false,
            client_version_override: Some("1.0.0-test".into()),
            nebula_version_override: Some("1.9.7".into()),
            start_nebula: true,
            poll_interval_hours: 24,
            process_check_interval: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(60),
            config_fetch_timeout: Duration::from_secs(5),
            max_restart_attempts: 3,
            max_fetch_retries: 2,
            post_restart_wait: Duration::from_millis(1),
            restart_init_timeout: Duration::from_millis(1),
        };

        let mut supervisor =
            Supervisor::new(NebulaCli::new("/nonexistent/nebula"), paths.clone(), Duration::from_millis(1));
        let metrics = crate::metrics::SharedMetrics::load(paths.metrics_file());

        let outcome =
            run_once(&config, &paths, &cert_cli_path, "/nonexistent/nebula", &mut supervisor, false, &metrics)
                .await
                .unwrap();

        assert!(outcome.config_changed);
        assert!(!outcome.nebula_upgraded);
        assert_eq!(std::fs::read_to_string(paths.config_path()).unwrap(), "listen: {}");
        assert_eq!(std::fs::read_to_string(paths.key_path()).unwrap().trim(), "fake-key");
    }
}
