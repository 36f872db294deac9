//! Operator-facing counters persisted to `metrics.json`, read by both
//! execution contexts in monitor mode (spec §5: "share `metrics` under an
//! exclusive lock, no other shared state").

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nebula_error::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metrics {
    pub crash_count: u64,
    pub disconnect_count: u64,
    pub restart_count: u64,
    pub config_fetch_failures: u64,
    pub consecutive_failures: u32,
    #[serde(default)]
    pub last_crash_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_successful_restart: Option<DateTime<Utc>>,
}

impl Metrics {
    /// Load from `path`, falling back to zeroed metrics if the file is
    /// missing or unreadable -- a corrupt metrics file must never block the
    /// agent from starting.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Write to `path`, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Whether `consecutive_failures` has reached the supervisor's ceiling.
    #[must_use]
    pub fn is_exhausted(&self, max_restart_attempts: u32) -> bool {
        self.consecutive_failures >= max_restart_attempts
    }
}

/// `metrics.json` guarded by one in-process lock, so the reconcile loop and
/// the monitor loop (spec §4.5's two concurrent `--monitor` tasks) never
/// interleave a read-modify-write the way two independent
/// `Metrics::load`/`save` pairs would. Mirrors the Python agent's single
/// `metrics_lock` shared by its main thread and its monitor thread.
#[derive(Clone)]
pub struct SharedMetrics {
    path: PathBuf,
    inner: Arc<Mutex<Metrics>>,
}

impl SharedMetrics {
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let metrics = Metrics::load(&path);
        Self { path, inner: Arc::new(Mutex::new(metrics)) }
    }

    /// Lock, apply `f`, persist, unlock -- the same shape as every
    /// `with metrics_lock: ...; metrics.save()` block in the original.
    pub async fn update(&self, f: impl FnOnce(&mut Metrics)) {
        let mut guard = self.inner.lock().await;
        f(&mut guard);
        if let Err(err) = guard.save(&self.path) {
            tracing::warn!(%err, "failed to persist metrics");
        }
    }

    pub async fn snapshot(&self) -> Metrics {
        *self.inner.lock().await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let mut metrics = Metrics::default();
        metrics.crash_count = 3;
        metrics.consecutive_failures = 2;
        metrics.last_crash_time = Some(Utc::now());
        metrics.save(&path).unwrap();

        let loaded = Metrics::load(&path);
        assert_eq!(loaded, metrics);
    }

    #[test]
    fn missing_file_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        assert_eq!(Metrics::load(&path), Metrics::default());
    }

    #[test]
    fn corrupt_file_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Metrics::load(&path), Metrics::default());
    }

    #[test]
    fn exhaustion_triggers_at_the_configured_ceiling() {
        let mut metrics = Metrics::default();
        metrics.consecutive_failures = 4;
        assert!(!metrics.is_exhausted(5));
        metrics.consecutive_failures = 5;
        assert!(metrics.is_exhausted(5));
    }

    #[tokio::test]
    async fn concurrent_updates_persist_to_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let shared = SharedMetrics::load(&path);

        let a = shared.clone();
        let b = shared.clone();
        tokio::join!(
            async { for _ in 0..50 { a.update(|m| m.config_fetch_failures += 1).await; } },
            async { for _ in 0..50 { b.update(|m| m.crash_count += 1).await; } },
        );

        let snapshot = shared.snapshot().await;
        assert_eq!(snapshot.config_fetch_failures, 50);
        assert_eq!(snapshot.crash_count, 50);
        assert_eq!(Metrics::load(&path), snapshot);
    }
}
