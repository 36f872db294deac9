//! `POST /v1/client/config`: the system's hot path (spec §4.3).
//!
//! Every repository lookup this endpoint needs happens here, up front;
//! `nebula_netconfig::build_config` itself is a pure function over already
//! -resolved inputs so it stays exhaustively unit-testable without a store.

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use nebula_cert::IssueRequest;
use nebula_core::{Node, OsType};
use nebula_error::{ErrorKind, NebulaError};
use nebula_netconfig::{ConfigInputs, LighthouseEntry, build_config, filter_ca_bundle, negotiate_cert_version, paths_for, supports_v2};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// The rendered document plus the CA chain it was built against, shared by
/// both the node-facing fetch below and the admin replay in
/// `handlers::nodes::config`.
pub(crate) struct RenderedConfig {
    pub(crate) config_yaml: String,
    pub(crate) ca_chain_pems: Vec<String>,
}

/// Assemble the config document for a node from its already-persisted
/// state, without issuing or rotating a certificate. Used both by step
/// 10-13 of [`fetch`] (inline, with a freshly issued cert) and by the
/// admin-facing replay endpoint (with the node's existing cert).
pub(crate) async fn assemble(
    state: &AppState,
    node: &Node,
    cert_pem: &str,
) -> ApiResult<RenderedConfig> {
    let assignments = state.storage.ipam.list_assignments_for_node(node.id).await?;
    let primary = assignments
        .iter()
        .find(|a| a.is_primary)
        .ok_or_else(|| NebulaError::not_found("primary IP assignment for node", node.id.to_string()))
        .map_err(ApiError::prerequisite)?;

    let bundle = state.storage.ca.included_in_config().await?;
    let global = state.storage.settings.get_global().await?;
    let client_supports_v2 = supports_v2(node.nebula_version.as_ref());
    let filtered_bundle = filter_ca_bundle(bundle, client_supports_v2).map_err(ApiError::prerequisite)?;

    let mut peer_lighthouses = Vec::new();
    for candidate in state.storage.node.list(None).await? {
        if !candidate.is_lighthouse || candidate.id == node.id {
            continue;
        }
        let Some(public_ip) = candidate.public_ip else { continue };
        let candidate_assignments = state.storage.ipam.list_assignments_for_node(candidate.id).await?;
        let Some(overlay) = candidate_assignments.iter().find(|a| a.is_primary && a.pool_id == primary.pool_id)
        else {
            continue;
        };
        peer_lighthouses.push(LighthouseEntry { overlay_ip: overlay.address, public_ip });
    }

    let blocklist = state.cert_manager.active_revoked_fingerprints().await?;

    let mut firewall_rules = Vec::new();
    for ruleset_id in &node.ruleset_ids {
        firewall_rules.extend(state.storage.firewall.list_rules(*ruleset_id).await?);
    }

    let inputs = ConfigInputs {
        node,
        primary_ip: primary.address,
        ca_bundle: &filtered_bundle,
        cert_pem,
        blocklist,
        peer_lighthouses: &peer_lighthouses,
        firewall_rules: &firewall_rules,
        global: &global,
    };
    let config_yaml = build_config(&inputs).to_yaml()?;
    Ok(RenderedConfig {
        config_yaml,
        ca_chain_pems: filtered_bundle.into_iter().map(|ca| ca.cert_pem).collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ClientConfigRequest {
    token: String,
    public_key: String,
    client_version: Option<String>,
    nebula_version: Option<String>,
    os_type: OsType,
}

#[derive(Debug, Serialize)]
pub struct ClientConfigResponse {
    config: String,
    client_cert_pem: String,
    ca_chain_pems: Vec<String>,
    cert_not_before: DateTime<Utc>,
    cert_not_after: DateTime<Utc>,
    lighthouse: bool,
    key_path: String,
}

/// Errors from a genuine "prerequisite missing" call site (no signing CA,
/// no default pool, no compatible CA bundle) become 503 regardless of the
/// `ErrorKind` that produced them; everything else falls through to the
/// default mapping.
fn prerequisite_or_default(err: NebulaError) -> ApiError {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::Validation => ApiError::prerequisite(err),
        _ => err.into(),
    }
}

pub async fn fetch(
    State(state): State<AppState>,
    Json(request): Json<ClientConfigRequest>,
) -> ApiResult<Json<ClientConfigResponse>> {
    // Step 1: resolve and validate the bearer token.
    let token = state
        .token_manager
        .resolve(&request.token)
        .await?
        .filter(|t| t.is_active)
        .ok_or_else(|| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "unknown or inactive token"))?;
    let node = state.storage.node.get(token.node_id).await?;
    if node.is_blocked {
        return Err(ApiError::new(axum::http::StatusCode::FORBIDDEN, "node is blocked"));
    }

    let nebula_version = request
        .nebula_version
        .as_deref()
        .map(semver::Version::parse)
        .transpose()
        .map_err(|e| NebulaError::validation(format!("invalid nebula_version: {e}")))?;

    // Step 2: resolve (or allocate) the node's primary IP assignment.
    let mut assignments = state.storage.ipam.list_assignments_for_node(node.id).await?;
    if !assignments.iter().any(|a| a.is_primary) {
        let pool = state.ip_allocator.ensure_default_pool().await.map_err(ApiError::prerequisite)?;
        state.ip_allocator.allocate_primary(pool.id, node.id).await.map_err(prerequisite_or_default)?;
        assignments = state.storage.ipam.list_assignments_for_node(node.id).await?;
    }
    let primary = assignments
        .iter()
        .find(|a| a.is_primary)
        .ok_or_else(|| NebulaError::internal("primary IP assignment missing after allocation"))?;
    let pool = state.storage.ipam.get_pool(primary.pool_id).await?;
    let cidr_prefix = pool.cidr.prefix_len();
    let all_ips: Vec<String> =
        assignments.iter().map(|a| format!("{}/{}", a.address, cidr_prefix)).collect();

    // Step 3: active CA bundle.
    let bundle = state.storage.ca.included_in_config().await?;

    // Step 4: negotiate cert_version.
    let global = state.storage.settings.get_global().await?;
    let cert_version =
        negotiate_cert_version(global.cert_version, node.ip_version, nebula_version.as_ref())?;
    let client_supports_v2 = supports_v2(nebula_version.as_ref());

    // Step 5: filter the CA bundle for this client.
    let filtered_bundle = filter_ca_bundle(bundle, client_supports_v2).map_err(ApiError::prerequisite)?;

    // Step 6: issue or reuse the host certificate.
    let mut group_names = Vec::with_capacity(node.group_ids.len());
    for group_id in &node.group_ids {
        group_names.push(state.storage.group.get(*group_id).await?.name);
    }
    let issue_request = IssueRequest {
        node: node.clone(),
        public_key_pem: request.public_key,
        primary_ip: primary.address,
        cidr_prefix,
        cert_version,
        all_ips,
        group_names,
    };
    let host_cert =
        state.cert_manager.issue_or_rotate(&issue_request).await.map_err(prerequisite_or_default)?;

    // Steps 7-8: static host map / lighthouse hosts.
    let mut peer_lighthouses = Vec::new();
    for candidate in state.storage.node.list(None).await? {
        if !candidate.is_lighthouse || candidate.id == node.id {
            continue;
        }
        let Some(public_ip) = candidate.public_ip else { continue };
        let candidate_assignments = state.storage.ipam.list_assignments_for_node(candidate.id).await?;
        let Some(overlay) = candidate_assignments.iter().find(|a| a.is_primary && a.pool_id == primary.pool_id)
        else {
            continue;
        };
        peer_lighthouses.push(LighthouseEntry { overlay_ip: overlay.address, public_ip });
    }

    // Step 9: active revoked fingerprints.
    let blocklist = state.cert_manager.active_revoked_fingerprints().await?;

    // Step 10-11: firewall rules, then assemble the document.
    let mut firewall_rules = Vec::new();
    for ruleset_id in &node.ruleset_ids {
        firewall_rules.extend(state.storage.firewall.list_rules(*ruleset_id).await?);
    }

    let inputs = ConfigInputs {
        node: &node,
        primary_ip: primary.address,
        ca_bundle: &filtered_bundle,
        cert_pem: &host_cert.cert_pem,
        blocklist,
        peer_lighthouses: &peer_lighthouses,
        firewall_rules: &firewall_rules,
        global: &global,
    };
    let config = build_config(&inputs);
    let config_yaml = config.to_yaml()?;
    let key_path = paths_for(request.os_type).key.to_string();

    // Step 12: record the fetch.
    state
        .storage
        .node
        .record_checkin(node.id, request.client_version, nebula_version, request.os_type)
        .await?;

    // Step 13: return shape.
    Ok(Json(ClientConfigResponse {
        config: config_yaml,
        client_cert_pem: host_cert.cert_pem,
        ca_chain_pems: filtered_bundle.into_iter().map(|ca| ca.cert_pem).collect(),
        cert_not_before: host_cert.not_before,
        cert_not_after: host_cert.not_after,
        lighthouse: node.is_lighthouse,
        key_path,
    }))
}
