//! Talks to the control plane's node-facing surface: `GET /v1/version` (the
//! upgrade check) and `POST /v1/client/config` (the reconcile fetch, with
//! retry/backoff and a cached-file fallback per spec §4.5 steps 2-3).

use std::path::Path;
use std::time::Duration;

use nebula_error::{NebulaError, Result};
use nebula_resilience::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::metrics::SharedMetrics;

#[derive(Debug, Clone, Serialize)]
struct ConfigFetchRequest {
    token: String,
    public_key: String,
    client_version: String,
    nebula_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedConfig {
    pub config: String,
    pub client_cert_pem: String,
    pub ca_chain_pems: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(default)]
    nebula_version: Option<String>,
}

/// Thin `reqwest` client, one per reconcile cycle, configured with the
/// fetch timeout and the operator's self-signed-cert tolerance.
pub struct ControlPlaneClient {
    http: reqwest::Client,
    server_url: String,
}

impl ControlPlaneClient {
    pub fn new(server_url: &str, allow_self_signed_cert: bool, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(allow_self_signed_cert)
            .build()
            .map_err(|err| NebulaError::internal(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, server_url: server_url.trim_end_matches('/').to_string() })
    }

    /// `GET /v1/version`'s `nebula_version`, the fleet-wide target version
    /// the agent compares its local `nebula -version` against.
    pub async fn server_nebula_version(&self) -> Result<Option<String>> {
        let url = format!("{}/v1/version", self.server_url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| NebulaError::external(format!("version check failed: {err}")))?
            .error_for_status()
            .map_err(|err| NebulaError::external(format!("version check failed: {err}")))?;
        let body: VersionResponse = response
            .json()
            .await
            .map_err(|err| NebulaError::external(format!("invalid version response: {err}")))?;
        Ok(body.nebula_version)
    }

    async fn fetch_once(
        &self,
        token: &str,
        public_key: &str,
        client_version: &str,
        nebula_version: &str,
    ) -> Result<FetchedConfig> {
        let url = format!("{}/v1/client/config", self.server_url);
        let request = ConfigFetchRequest {
            token: token.to_string(),
            public_key: public_key.to_string(),
            client_version: client_version.to_string(),
            nebula_version: nebula_version.to_string(),
        };
        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|err| NebulaError::external(format!("config fetch failed: {err}")))?
            .error_for_status()
            .map_err(|err| NebulaError::external(format!("config fetch failed: {err}")))?;
        response.json().await.map_err(|err| NebulaError::external(format!("invalid config response: {err}")))
    }

    /// Retry the config fetch up to `max_attempts` times with
    /// `ExponentialBackoff::agent_fetch()`, caching a success to
    /// `cache_path` and falling back to that cache if every attempt fails.
    /// `metrics`, when given, tracks `config_fetch_failures` the same way
    /// the Python agent's `fetch_config_with_retry` does: incremented per
    /// failed attempt, reset to zero on success.
    pub async fn fetch_config_with_retry(
        &self,
        token: &str,
        public_key: &str,
        client_version: &str,
        nebula_version: &str,
        max_attempts: u32,
        cache_path: &Path,
        metrics: Option<&SharedMetrics>,
    ) -> Result<FetchedConfig> {
        let backoff = ExponentialBackoff::agent_fetch();
        let result = nebula_resilience::retry(backoff, max_attempts, || async {
            let attempt = self.fetch_once(token, public_key, client_version, nebula_version).await;
            if let (Err(err), Some(metrics)) = (&attempt, metrics) {
                metrics.update(|m| m.config_fetch_failures += 1).await;
                warn!(%err, "config fetch attempt failed");
            }
            attempt
        })
        .await;

        match result {
            Ok(config) => {
                if let Some(metrics) = metrics {
                    metrics.update(|m| m.config_fetch_failures = 0).await;
                }
                cache_config(cache_path, &config);
                Ok(config)
            },
            Err(err) => {
                warn!(%err, "all config fetch attempts failed, falling back to cache");
                load_cached_config(cache_path).ok_or(err)
            },
        }
    }
}

fn cache_config(path: &Path, config: &FetchedConfig) {
    let Ok(json) = serde_json::to_string_pretty(config) else { return };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(path, json) {
        Ok(()) => info!("config cached successfully"),
        Err(err) => warn!(%err, "failed to cache config"),
    }
}

fn load_cached_config(path: &Path) -> Option<FetchedConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn server_nebula_version_parses_the_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "managed_nebula_version": "0.3.0",
                "nebula_version": "1.9.7",
            })))
            .mount(&server)
            .await;

        let client = ControlPlaneClient::new(&server.uri(), false, Duration::from_secs(5)).unwrap();
        let version = client.server_nebula_version().await.unwrap();
        assert_eq!(version.as_deref(), Some("1.9.7"));
    }

    #[tokio::test]
    async fn successful_fetch_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/client/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "config": "yaml-here",
                "client_cert_pem": "cert-pem",
                "ca_chain_pems": ["ca-pem"],
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cached_config.json");
        let client = ControlPlaneClient::new(&server.uri(), false, Duration::from_secs(5)).unwrap();
        let config = client
            .fetch_config_with_retry("token", "pubkey", "1.0.0", "1.9.7", 3, &cache_path, None)
            .await
            .unwrap();
        assert_eq!(config.config, "yaml-here");
        assert!(cache_path.exists());
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/client/config"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cached_config.json");
        std::fs::write(
            &cache_path,
            serde_json::to_string(&FetchedConfig {
                config: "cached-yaml".into(),
                client_cert_pem: "cached-cert".into(),
                ca_chain_pems: vec!["cached-ca".into()],
            })
            .unwrap(),
        )
        .unwrap();

        let client = ControlPlaneClient::new(&server.uri(), false, Duration::from_millis(500)).unwrap();
        let config = client
            .fetch_config_with_retry("token", "pubkey", "1.0.0", "1.9.7", 2, &cache_path, None)
            .await
            .unwrap();
        assert_eq!(config.config, "cached-yaml");
    }

    #[tokio::test]
    async fn failed_attempts_are_counted_and_reset_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/client/config"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/client/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "config": "yaml-here",
                "client_cert_pem": "cert-pem",
                "ca_chain_pems": ["ca-pem"],
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cached_config.json");
        let metrics = crate::metrics::SharedMetrics::load(dir.path().join("metrics.json"));
        let client = ControlPlaneClient::new(&server.uri(), false, Duration::from_secs(5)).unwrap();
        client
            .fetch_config_with_retry("token", "pubkey", "1.0.0", "1.9.7", 5, &cache_path, Some(&metrics))
            .await
            .unwrap();

        assert_eq!(metrics.snapshot().await.config_fetch_failures, 0);
    }

    #[tokio::test]
    async fn exhausted_retries_without_a_cache_propagate_the_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/client/config"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cached_config.json");
        let client = ControlPlaneClient::new(&server.uri(), false, Duration::from_millis(500)).unwrap();
        let err = client
            .fetch_config_with_retry("token", "pubkey", "1.0.0", "1.9.7", 2, &cache_path, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), nebula_error::ErrorKind::External);
    }
}
