//! Retry and backoff primitives shared by the node agent's fetch loop, the
//! process supervisor's restart policy, and the server's advisory cache.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff with a cap and optional jitter.
///
/// `delay(attempt)` computes `min(base * multiplier^attempt, max)`, where
/// `attempt` is zero-based (the first retry uses `attempt == 0`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Upper bound on the computed delay.
    pub max: Duration,
    /// Whether to apply full jitter (uniform random in `[0, delay]`).
    pub jitter: bool,
}

impl ExponentialBackoff {
    /// The agent's fetch retry policy: `min(2^attempt, 60s)`.
    #[must_use]
    pub fn agent_fetch() -> Self {
        Self { base: Duration::from_secs(1), multiplier: 2.0, max: Duration::from_secs(60), jitter: true }
    }

    /// The supervisor's restart backoff: `min(2^(attempt-1), 30s)`.
    #[must_use]
    pub fn supervisor_restart() -> Self {
        Self { base: Duration::from_secs(1), multiplier: 2.0, max: Duration::from_secs(30), jitter: true }
    }

    /// Compute the delay for a zero-based attempt number, before jitter.
    #[must_use]
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.try_into().unwrap_or(i32::MAX));
        let secs = self.base.as_secs_f64() * factor;
        Duration::from_secs_f64(secs).min(self.max)
    }

    /// Compute the delay for an attempt, applying full jitter if configured.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = self.raw_delay(attempt);
        if self.jitter && !raw.is_zero() {
            let millis = rand::rng().random_range(0..=raw.as_millis().max(1) as u64);
            Duration::from_millis(millis)
        } else {
            raw
        }
    }

    /// Sleep for the computed delay of the given attempt.
    pub async fn wait(&self, attempt: u32) {
        tokio::time::sleep(self.delay(attempt)).await;
    }
}

/// Retry an async operation up to `max_attempts` times, sleeping according to
/// `backoff` between attempts. Returns the last error if every attempt fails.
pub async fn retry<T, E, F, Fut>(
    backoff: ExponentialBackoff,
    max_attempts: u32,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(err);
                }
                backoff.wait(attempt - 1).await;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn raw_delay_grows_and_caps() {
        let backoff = ExponentialBackoff {
            base: Duration::from_secs(1),
            multiplier: 2.0,
            max: Duration::from_secs(10),
            jitter: false,
        };
        assert_eq!(backoff.raw_delay(0), Duration::from_secs(1));
        assert_eq!(backoff.raw_delay(1), Duration::from_secs(2));
        assert_eq!(backoff.raw_delay(2), Duration::from_secs(4));
        assert_eq!(backoff.raw_delay(10), Duration::from_secs(10));
    }

    #[test]
    fn jitter_never_exceeds_raw_delay() {
        let backoff = ExponentialBackoff {
            base: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };
        for attempt in 0..5 {
            let d = backoff.delay(attempt);
            assert!(d <= backoff.raw_delay(attempt));
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let backoff = ExponentialBackoff {
            base: Duration::from_millis(1),
            multiplier: 1.0,
            max: Duration::from_millis(1),
            jitter: false,
        };
        let result: Result<u32, &str> = retry(backoff, 5, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("transient") } else { Ok(n) } }
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let backoff = ExponentialBackoff {
            base: Duration::from_millis(1),
            multiplier: 1.0,
            max: Duration::from_millis(1),
            jitter: false,
        };
        let result: Result<u32, &str> = retry(backoff, 3, || async { Err("always fails") }).await;
        assert_eq!(result, Err("always fails"));
    }
}
