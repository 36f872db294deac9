//! Structured logging bootstrap shared by `nebula-server` and `nebula-agent`.
//!
//! Wraps `tracing` + `tracing-subscriber` behind a small builder so both
//! binaries configure logging identically: an `EnvFilter` driven by
//! `RUST_LOG` (default `info`), optional JSON output for production, and
//! ANSI color for interactive terminals.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, ANSI-colored when stdout is a TTY.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregators.
    Json,
}

/// Logging configuration, normally built from environment variables.
#[derive(Debug, Clone)]
pub struct LoggerBuilder {
    default_filter: String,
    format: LogFormat,
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self { default_filter: "info".to_string(), format: LogFormat::Pretty }
    }
}

impl LoggerBuilder {
    /// Start from defaults (`info` level, pretty format).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Choose the output format.
    #[must_use]
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Install the subscriber as the global default.
    ///
    /// Safe to call at most once per process; a second call is a no-op
    /// (subsequent attempts to set a global subscriber are rejected by
    /// `tracing` and we swallow that error).
    pub fn init(self) {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::from_str(&self.default_filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(env_filter);

        match self.format {
            LogFormat::Pretty => {
                let _ = registry.with(tracing_subscriber::fmt::layer()).try_init();
            },
            LogFormat::Json => {
                let _ = registry
                    .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
                    .try_init();
            },
        }
    }
}

/// Install a default logger using `RUST_LOG` (or `info`) and pretty output.
///
/// Convenience for binaries that don't need to customize anything.
pub fn auto_init() {
    LoggerBuilder::new().init();
}

/// Re-exports for callers who want `tracing`'s macros without a direct
/// dependency on the `tracing` crate.
pub mod prelude {
    pub use tracing::{Level, debug, debug_span, error, info, info_span, instrument, trace, warn};
}
