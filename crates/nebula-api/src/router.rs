//! Assembles every handler module into one [`axum::Router`].
//!
//! Three distinct trust tiers share this router: the authenticated
//! admin/owner surface (JWT via [`crate::auth::AuthContext`]), the
//! node-facing `/v1/client/config` endpoint (its own bearer token, resolved
//! inline), and the fully public surface (GitHub secret-scanning plus
//! enrollment-code redemption), which alone gets
//! [`rate_limit::limit_public`] layered on top.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{acl, ca, client_config, enroll, health, ipam, nodes};
use crate::rate_limit::{self, PublicLimiter};
use crate::state::AppState;

/// Build the full router. `public_rate_limit_per_minute` governs the quota
/// applied to the unauthenticated surfaces.
#[must_use]
pub fn build_router(state: AppState, public_rate_limit_per_minute: u32) -> Router {
    let limiter: Arc<PublicLimiter> = rate_limit::new_limiter(public_rate_limit_per_minute);

    let public = Router::new()
        .route("/v1/enroll/{code}", get(enroll::redeem))
        .with_state(state.clone())
        .layer(axum::middleware::from_fn_with_state(limiter.clone(), rate_limit::limit_public));

    let webhook = nebula_webhook::router(state.webhook.clone())
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit::limit_public));

    let clients = Router::new()
        .route("/v1/clients", get(nodes::list).post(nodes::create))
        .route("/v1/clients/{id}", get(nodes::get).put(nodes::update).delete(nodes::delete))
        .route("/v1/clients/{id}/token/reissue", post(nodes::reissue_token))
        .route("/v1/clients/{id}/config", get(nodes::config))
        .route("/v1/clients/{id}/docker-compose", get(nodes::docker_compose))
        .route("/v1/clients/{id}/enrollment-code", post(nodes::create_enrollment_code))
        .route("/v1/clients/{id}/permissions", get(acl::list_client_permissions).put(acl::upsert_client_permission));

    let ca = Router::new()
        .route("/v1/ca", get(ca::list))
        .route("/v1/ca/create", post(ca::create))
        .route("/v1/ca/import", post(ca::import))
        .route("/v1/ca/{id}/set-signing", post(ca::set_signing))
        .route("/v1/ca/{id}", delete(ca::delete));

    let ipam = Router::new()
        .route("/v1/ip-pools", get(ipam::list_pools).post(ipam::create_pool))
        .route("/v1/ip-pools/{id}", get(ipam::get_pool))
        .route("/v1/ip-pools/{id}/groups", get(ipam::list_groups).post(ipam::create_group));

    let access_control = Router::new()
        .route("/v1/groups", get(acl::list_groups).post(acl::create_group))
        .route("/v1/groups/{id}", delete(acl::delete_group))
        .route("/v1/firewall/rulesets", get(acl::list_rulesets).post(acl::create_ruleset))
        .route("/v1/firewall/rulesets/{id}/rules", get(acl::list_rules).post(acl::add_rule))
        .route("/v1/firewall/rules/{id}", delete(acl::remove_rule))
        .route("/v1/permissions", get(acl::list_permissions).post(acl::create_permission))
        .route("/v1/user-groups", get(acl::list_user_groups).post(acl::create_user_group))
        .route("/v1/user-groups/{id}/users", post(acl::add_user))
        .route("/v1/user-groups/{id}/permissions", put(acl::set_permissions))
        .route("/v1/users", get(acl::list_users));

    let authenticated = clients.merge(ca).merge(ipam).merge(access_control).with_state(state.clone());

    let node_facing = Router::new()
        .route("/v1/client/config", post(client_config::fetch))
        .route("/v1/healthz", get(health::healthz))
        .route("/v1/version", get(health::version))
        .with_state(state);

    Router::new()
        .merge(public)
        .merge(webhook)
        .merge(authenticated)
        .merge(node_facing)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
