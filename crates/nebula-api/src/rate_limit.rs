//! Per-client-IP rate limiting for the fleet's unauthenticated endpoints:
//! the GitHub secret-scanning touch points and enrollment-code redemption
//! (spec §4.4, supplemented §2). These are the only routes reachable with
//! no credential at all, so they're the ones worth shielding from abusive
//! traffic before it ever reaches a repository lookup.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

/// Keyed by caller IP, backed by `governor`'s `DashMap` state store.
pub type PublicLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Build a limiter allowing `per_minute` requests per distinct IP.
#[must_use]
pub fn new_limiter(per_minute: u32) -> Arc<PublicLimiter> {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute.max(1)).expect("nonzero"));
    Arc::new(RateLimiter::dashmap(quota))
}

/// Middleware rejecting with `429` once a caller's quota is exhausted.
/// Nested only under the public routes; authenticated admin/owner traffic
/// is untouched.
pub async fn limit_public(
    State(limiter): State<Arc<PublicLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if limiter.check_key(&addr.ip()).is_err() {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}
