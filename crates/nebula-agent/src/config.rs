//! The agent's `SERVER_URL`/`CLIENT_TOKEN`/... surface, loaded the same
//! env-over-file way as the server's `GlobalSettings` boot defaults
//! (`nebula_config::Config`).

use std::time::Duration;

use nebula_error::Result;
use nebula_config::Config;

use crate::paths::StatePaths;

/// Everything the reconcile loop and supervisor need, resolved once at
/// startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub server_url: String,
    pub client_token: String,
    pub allow_self_signed_cert: bool,
    pub client_version_override: Option<String>,
    pub nebula_version_override: Option<String>,
    pub start_nebula: bool,
    pub poll_interval_hours: u64,
    pub process_check_interval: Duration,
    pub health_check_interval: Duration,
    pub config_fetch_timeout: Duration,
    pub max_restart_attempts: u32,
    pub max_fetch_retries: u32,
    pub post_restart_wait: Duration,
    pub restart_init_timeout: Duration,
}

impl AgentConfig {
    /// Load from `nebula-agent.toml` (if present) then environment
    /// variables, matching the precedence every other binary in this
    /// workspace uses.
    pub fn load() -> Result<Self> {
        let config = Config::new()
            .merge_file_if_exists("nebula-agent.toml")?
            .merge_env("server_url", "SERVER_URL")
            .merge_env("client_token", "CLIENT_TOKEN")
            .merge_env("allow_self_signed_cert", "ALLOW_SELF_SIGNED_CERT")
            .merge_env("client_version_override", "CLIENT_VERSION_OVERRIDE")
            .merge_env("nebula_version_override", "NEBULA_VERSION_OVERRIDE")
            .merge_env("start_nebula", "START_NEBULA")
            .merge_env("poll_interval_hours", "POLL_INTERVAL_HOURS")
            .merge_env("process_check_interval_secs", "PROCESS_CHECK_INTERVAL")
            .merge_env("health_check_interval_secs", "HEALTH_CHECK_INTERVAL")
            .merge_env("config_fetch_timeout_secs", "CONFIG_FETCH_TIMEOUT")
            .merge_env("max_restart_attempts", "MAX_RESTART_ATTEMPTS")
            .merge_env("max_fetch_retries", "MAX_FETCH_RETRIES")
            .merge_env("post_restart_wait_secs", "POST_RESTART_WAIT")
            .merge_env("restart_init_timeout_secs", "RESTART_INIT_TIMEOUT");

        Ok(Self {
            server_url: config.get_or("server_url", "http://localhost:8080".to_string())?,
            client_token: config.require("client_token")?.to_string(),
            allow_self_signed_cert: config.get_or("allow_self_signed_cert", false)?,
            client_version_override: config.get("client_version_override").map(str::to_string),
            nebula_version_override: config.get("nebula_version_override").map(str::to_string),
            start_nebula: config.get_or("start_nebula", true)?,
            poll_interval_hours: config.get_or("poll_interval_hours", 24)?,
            process_check_interval: Duration::from_secs(config.get_or("process_check_interval_secs", 10)?),
            health_check_interval: Duration::from_secs(config.get_or("health_check_interval_secs", 60)?),
            config_fetch_timeout: Duration::from_secs(config.get_or("config_fetch_timeout_secs", 30)?),
            max_restart_attempts: config.get_or("max_restart_attempts", 5)?,
            max_fetch_retries: config.get_or("max_fetch_retries", 5)?,
            post_restart_wait: Duration::from_secs(config.get_or("post_restart_wait_secs", 10)?),
            restart_init_timeout: Duration::from_secs(config.get_or("restart_init_timeout_secs", 30)?),
        })
    }

    #[must_use]
    pub fn paths(&self) -> StatePaths {
        StatePaths::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fails_without_a_client_token() {
        // No CLIENT_TOKEN env var set in a fresh test process; merge_file_if_exists
        // on a nonexistent file leaves the config empty.
        unsafe {
            std::env::remove_var("CLIENT_TOKEN");
        }
        let result = AgentConfig::load();
        assert!(result.is_err());
    }
}
