//! The two daily CA-lifecycle jobs (spec §4.6): `ensureFutureCA` at 03:00
//! UTC and `cleanupOldCAs` at 04:00 UTC. Grounded on the polling-loop idiom
//! the rest of the workspace uses for background tasks (a spawned
//! `tokio::time::interval` loop guarded against re-entrancy) rather than
//! pulling in a cron crate for two fixed-time daily jobs.
//!
//! The GitHub advisory/version-cache refresh is an explicit external
//! collaborator (out of scope here) and is not scheduled by this module.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveTime, Utc};
use nebula_cert::CertManager;
use nebula_ports::SettingsRepo;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

const ENSURE_FUTURE_CA_AT: NaiveTime = NaiveTime::from_hms_opt(3, 0, 0).expect("valid time");
const CLEANUP_OLD_CAS_AT: NaiveTime = NaiveTime::from_hms_opt(4, 0, 0).expect("valid time");
const ONE_DAY: StdDuration = StdDuration::from_secs(24 * 60 * 60);

/// Owns the two background job tasks. Dropping it aborts them.
pub struct Scheduler {
    ensure_future_ca: JoinHandle<()>,
    cleanup_old_cas: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn both daily jobs, each sleeping until its first scheduled
    /// occurrence before settling into a 24-hour cadence.
    #[must_use]
    pub fn start(cert_manager: Arc<CertManager>, settings: Arc<dyn SettingsRepo>) -> Self {
        let ensure_future_ca = {
            let cert_manager = cert_manager.clone();
            let settings = settings.clone();
            spawn_daily_job("ensure_future_ca", ENSURE_FUTURE_CA_AT, move || {
                let cert_manager = cert_manager.clone();
                let settings = settings.clone();
                async move { run_ensure_future_ca(&cert_manager, &settings).await }
            })
        };
        let cleanup_old_cas = spawn_daily_job("cleanup_old_cas", CLEANUP_OLD_CAS_AT, move || {
            let cert_manager = cert_manager.clone();
            async move { run_cleanup_old_cas(&cert_manager).await }
        });
        Self { ensure_future_ca, cleanup_old_cas }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.ensure_future_ca.abort();
        self.cleanup_old_cas.abort();
    }
}

#[instrument(skip(cert_manager, settings))]
async fn run_ensure_future_ca(cert_manager: &CertManager, settings: &Arc<dyn SettingsRepo>) {
    let server_version = match settings.get_global().await {
        Ok(global) => global.nebula_version,
        Err(err) => {
            error!(%err, "ensure_future_ca: failed to load global settings, skipping this run");
            return;
        },
    };
    match cert_manager.ensure_future_ca(server_version.as_ref()).await {
        Ok(created) if created.is_empty() => info!("ensure_future_ca: no rotation needed"),
        Ok(created) => info!(count = created.len(), "ensure_future_ca: created successor CA(s)"),
        Err(err) => error!(%err, "ensure_future_ca failed"),
    }
}

#[instrument(skip(cert_manager))]
async fn run_cleanup_old_cas(cert_manager: &CertManager) {
    match cert_manager.cleanup_old_cas().await {
        Ok(count) => info!(count, "cleanup_old_cas: deactivated expired previous CA(s)"),
        Err(err) => error!(%err, "cleanup_old_cas failed"),
    }
}

/// Sleep until `at` next occurs (today if still ahead, else tomorrow), run
/// `job` once, then repeat every 24 hours. A `Mutex` held for the duration
/// of each run makes the job non-reentrant even if a run somehow overran a
/// full day, matching the at-most-one-concurrent-run guarantee required of
/// the cert-rotation job.
fn spawn_daily_job<F, Fut>(name: &'static str, at: NaiveTime, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let guard = Arc::new(Mutex::new(()));
        sleep_until_next(at).await;
        let mut ticker = tokio::time::interval(ONE_DAY);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Ok(_permit) = guard.clone().try_lock_owned() else {
                tracing::warn!(job = name, "previous run still in flight, skipping this tick");
                continue;
            };
            job().await;
        }
    })
}

async fn sleep_until_next(at: NaiveTime) {
    let delay = (next_occurrence(Utc::now(), at) - Utc::now()).to_std().unwrap_or(StdDuration::ZERO);
    tokio::time::sleep(delay).await;
}

/// The next time `at` occurs at or after `now` -- today if `at` hasn't
/// passed yet, otherwise tomorrow.
fn next_occurrence(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now { today } else { today + chrono::Duration::days(1) }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn occurrence_later_today_stays_today() {
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 1, 0, 0).unwrap();
        let next = next_occurrence(now, ENSURE_FUTURE_CA_AT);
        assert_eq!(next.date_naive(), now.date_naive());
        assert_eq!(next.time(), ENSURE_FUTURE_CA_AT);
    }

    #[test]
    fn occurrence_already_passed_today_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 5, 0, 0).unwrap();
        let next = next_occurrence(now, ENSURE_FUTURE_CA_AT);
        assert_eq!(next.date_naive(), now.date_naive() + chrono::Duration::days(1));
        assert_eq!(next.time(), ENSURE_FUTURE_CA_AT);
    }

    #[test]
    fn occurrence_exactly_at_the_boundary_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 7, 29, 3, 0, 0).unwrap();
        let next = next_occurrence(now, ENSURE_FUTURE_CA_AT);
        assert_eq!(next.date_naive(), now.date_naive() + chrono::Duration::days(1));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn scheduler_drop_aborts_both_jobs_without_panicking() {
        let state = crate::state::test_state();
        let scheduler = Scheduler::start(state.cert_manager.clone(), state.storage.settings.clone());
        drop(scheduler);
    }
}
