//! Filesystem layout for the agent's persistent state, mirroring the
//! original Python client's fixed paths so an operator migrating from it
//! finds the same files in the same places.

use std::path::PathBuf;

/// Where the agent keeps its keypair, PID file, metrics, and config cache.
/// Defaults to `/var/lib/nebula`, overridable via `NEBULA_STATE_DIR`.
#[derive(Debug, Clone)]
pub struct StatePaths {
    state_dir: PathBuf,
    config_path: PathBuf,
}

impl StatePaths {
    #[must_use]
    pub fn new(state_dir: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self { state_dir: state_dir.into(), config_path: config_path.into() }
    }

    /// Standard layout: state under `/var/lib/nebula`, config under `/etc/nebula`.
    #[must_use]
    pub fn standard() -> Self {
        let state_dir = std::env::var("NEBULA_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/lib/nebula"));
        Self::new(state_dir, "/etc/nebula/config.yml")
    }

    #[must_use]
    pub fn state_dir(&self) -> &std::path::Path {
        &self.state_dir
    }

    #[must_use]
    pub fn key_path(&self) -> PathBuf {
        self.state_dir.join("host.key")
    }

    #[must_use]
    pub fn pub_path(&self) -> PathBuf {
        self.state_dir.join("host.pub")
    }

    #[must_use]
    pub fn pidfile(&self) -> PathBuf {
        self.state_dir.join("nebula.pid")
    }

    #[must_use]
    pub fn metrics_file(&self) -> PathBuf {
        self.state_dir.join("metrics.json")
    }

    #[must_use]
    pub fn cached_config_file(&self) -> PathBuf {
        self.state_dir.join("cached_config.json")
    }

    #[must_use]
    pub fn config_path(&self) -> &std::path::Path {
        &self.config_path
    }

    #[must_use]
    pub fn ca_path(&self) -> PathBuf {
        self.config_path.with_file_name("ca.crt")
    }

    #[must_use]
    pub fn cert_path(&self) -> PathBuf {
        self.config_path.with_file_name("host.crt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_live_under_state_dir() {
        let paths = StatePaths::new("/tmp/nebula-state", "/etc/nebula/config.yml");
        assert_eq!(paths.key_path(), PathBuf::from("/tmp/nebula-state/host.key"));
        assert_eq!(paths.pidfile(), PathBuf::from("/tmp/nebula-state/nebula.pid"));
        assert_eq!(paths.ca_path(), PathBuf::from("/etc/nebula/ca.crt"));
        assert_eq!(paths.cert_path(), PathBuf::from("/etc/nebula/host.crt"));
    }
}
