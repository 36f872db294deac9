//! `/v1/clients[/...]`: node CRUD, token reissue, config/docker-compose
//! fetch, enrollment-code issuance (spec §6, supplemented §2).

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use nebula_core::{FirewallRulesetId, GroupId, IpVersion, Node, NodeId, OsType, UserId};
use nebula_error::NebulaError;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthContext, NodeAccess, authorize_node};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct NodeResponse {
    pub id: NodeId,
    pub name: String,
    pub is_lighthouse: bool,
    pub public_ip: Option<std::net::Ipv4Addr>,
    pub is_blocked: bool,
    pub owner_user_id: Option<UserId>,
    pub ip_version: IpVersion,
    pub os_type: OsType,
    pub group_ids: Vec<GroupId>,
    pub ruleset_ids: Vec<FirewallRulesetId>,
    pub client_version: Option<String>,
    pub nebula_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Node> for NodeResponse {
    fn from(node: Node) -> Self {
        Self {
            id: node.id,
            name: node.name,
            is_lighthouse: node.is_lighthouse,
            public_ip: node.public_ip,
            is_blocked: node.is_blocked,
            owner_user_id: node.owner_user_id,
            ip_version: node.ip_version,
            os_type: node.os_type,
            group_ids: node.group_ids,
            ruleset_ids: node.ruleset_ids,
            client_version: node.client_version,
            nebula_version: node.nebula_version.map(|v| v.to_string()),
            created_at: node.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateNodeRequest {
    pub name: String,
    pub is_lighthouse: bool,
    pub public_ip: Option<std::net::Ipv4Addr>,
    pub owner_user_id: Option<UserId>,
    pub ip_version: IpVersion,
    pub os_type: OsType,
}

#[derive(Debug, Serialize)]
pub struct CreateNodeResponse {
    #[serde(flatten)]
    pub node: NodeResponse,
    /// The raw value of the token just issued for this node. Never
    /// recoverable again outside `/token/reissue`.
    pub token: String,
}

/// `POST /v1/clients`: admin-or-owner gated (a caller without an admin
/// session may only enroll nodes under their own ownership). Issues the
/// node's first active token as part of enrollment.
pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<CreateNodeRequest>,
) -> ApiResult<Json<CreateNodeResponse>> {
    if !ctx.is_admin && request.owner_user_id != Some(ctx.user_id) {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "cannot enroll a node owned by another user"));
    }
    let now = Utc::now();
    let node = Node {
        id: NodeId::new(),
        name: request.name,
        is_lighthouse: request.is_lighthouse,
        public_ip: request.public_ip,
        is_blocked: false,
        owner_user_id: request.owner_user_id,
        ip_version: request.ip_version,
        os_type: request.os_type,
        group_ids: Vec::new(),
        ruleset_ids: Vec::new(),
        client_version: None,
        nebula_version: None,
        config_last_changed_at: now,
        last_config_download_at: None,
        last_version_report_at: None,
        created_at: now,
    };
    state.storage.node.create(node.clone()).await?;
    let token = state.token_manager.issue(node.id, request.owner_user_id).await?;
    Ok(Json(CreateNodeResponse { node: node.into(), token: token.value }))
}

/// `GET /v1/clients`: admins see every node, non-admins only their own.
pub async fn list(State(state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Vec<NodeResponse>>> {
    let owner_filter = if ctx.is_admin { None } else { Some(ctx.user_id) };
    let nodes = state.storage.node.list(owner_filter).await?;
    Ok(Json(nodes.into_iter().map(NodeResponse::from).collect()))
}

/// `GET /v1/clients/{id}`: admin/owner/permitted.
pub async fn get(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<NodeId>,
) -> ApiResult<Json<NodeResponse>> {
    let node = state.storage.node.get(id).await?;
    authorize_node(&state, &ctx, &node, NodeAccess::View).await?;
    Ok(Json(node.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateNodeRequest {
    pub is_blocked: Option<bool>,
    pub group_ids: Option<Vec<GroupId>>,
    pub ruleset_ids: Option<Vec<FirewallRulesetId>>,
}

/// `PUT /v1/clients/{id}`: admin-or-owner gated.
pub async fn update(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<NodeId>,
    Json(request): Json<UpdateNodeRequest>,
) -> ApiResult<Json<NodeResponse>> {
    let node = state.storage.node.get(id).await?;
    authorize_node(&state, &ctx, &node, NodeAccess::Update).await?;
    if let Some(blocked) = request.is_blocked {
        state.storage.node.set_blocked(id, blocked).await?;
    }
    if let Some(group_ids) = request.group_ids {
        state.storage.node.set_groups(id, group_ids).await?;
    }
    if let Some(ruleset_ids) = request.ruleset_ids {
        state.storage.node.set_rulesets(id, ruleset_ids).await?;
    }
    let updated = state.storage.node.get(id).await?;
    Ok(Json(updated.into()))
}

/// `DELETE /v1/clients/{id}`: admin-or-owner gated; cascades tokens, certs,
/// and IP assignments per `NodeRepo::delete`.
pub async fn delete(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<NodeId>,
) -> ApiResult<StatusCode> {
    let node = state.storage.node.get(id).await?;
    authorize_node(&state, &ctx, &node, NodeAccess::Update).await?;
    state.storage.node.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ReissueResponse {
    pub id: nebula_core::TokenId,
    pub token: String,
    pub client_id: NodeId,
    pub created_at: DateTime<Utc>,
    pub old_token_id: nebula_core::TokenId,
}

/// `POST /v1/clients/{id}/token/reissue`: the one response that ever
/// reveals a raw token value again after initial enrollment.
pub async fn reissue_token(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<NodeId>,
) -> ApiResult<Json<ReissueResponse>> {
    let node = state.storage.node.get(id).await?;
    authorize_node(&state, &ctx, &node, NodeAccess::Update).await?;
    let existing = state
        .storage
        .token
        .list_for_node(id)
        .await?
        .into_iter()
        .find(|t| t.is_active)
        .ok_or_else(|| NebulaError::not_found("active token for node", id.to_string()))?;
    let reissued = state.token_manager.reissue(existing.id).await?;
    Ok(Json(ReissueResponse {
        id: reissued.id,
        token: reissued.value,
        client_id: id,
        created_at: reissued.created_at,
        old_token_id: existing.id,
    }))
}

#[derive(Debug, Serialize)]
pub struct NodeConfigResponse {
    pub config_yaml: String,
    pub client_cert_pem: String,
    pub ca_chain_pems: Vec<String>,
}

/// `GET /v1/clients/{id}/config`: admin/owner/permitted replay of the same
/// document the node itself last fetched via `POST /v1/client/config`,
/// without re-issuing a certificate.
pub async fn config(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<NodeId>,
) -> ApiResult<Json<NodeConfigResponse>> {
    let node = state.storage.node.get(id).await?;
    authorize_node(&state, &ctx, &node, NodeAccess::DownloadConfig).await?;
    let cert = state
        .storage
        .host_cert
        .latest_non_revoked_for_node(id)
        .await?
        .ok_or_else(|| NebulaError::not_found("host certificate for node", id.to_string()))
        .map_err(ApiError::prerequisite)?;
    let rendered = super::client_config::assemble(&state, &node, &cert.cert_pem).await?;
    Ok(Json(NodeConfigResponse {
        config_yaml: rendered.config_yaml,
        client_cert_pem: cert.cert_pem,
        ca_chain_pems: rendered.ca_chain_pems,
    }))
}

/// `GET /v1/clients/{id}/docker-compose`: `{{placeholder}}` substitution
/// over `GlobalSettings.docker_compose_template`.
pub async fn docker_compose(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<NodeId>,
) -> ApiResult<String> {
    let node = state.storage.node.get(id).await?;
    authorize_node(&state, &ctx, &node, NodeAccess::DownloadDockerConfig).await?;
    let global = state.storage.settings.get_global().await?;
    let token = state
        .storage
        .token
        .list_for_node(id)
        .await?
        .into_iter()
        .find(|t| t.is_active)
        .ok_or_else(|| NebulaError::not_found("active token for node", id.to_string()))?;
    let rendered = global
        .docker_compose_template
        .replace("{{client_id}}", &id.to_string())
        .replace("{{client_name}}", &node.name)
        .replace("{{token}}", &token.value)
        .replace("{{server_url}}", &global.server_url)
        .replace("{{image}}", &global.client_docker_image);
    Ok(rendered)
}

#[derive(Debug, Serialize)]
pub struct EnrollmentCodeResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// `POST /v1/clients/{id}/enrollment-code`: admin-or-owner gated, lets an
/// operator hand a new device a short-lived code instead of a raw token.
pub async fn create_enrollment_code(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<NodeId>,
) -> ApiResult<Json<EnrollmentCodeResponse>> {
    let node = state.storage.node.get(id).await?;
    authorize_node(&state, &ctx, &node, NodeAccess::Update).await?;
    let code = nebula_token::generate("ENR");
    let expires_at = Utc::now() + chrono::Duration::minutes(15);
    let record = nebula_core::EnrollmentCode {
        id: nebula_core::EnrollmentCodeId::new(),
        node_id: id,
        code: code.clone(),
        expires_at,
        used_at: None,
    };
    state.storage.enrollment.create(record).await?;
    Ok(Json(EnrollmentCodeResponse { code, expires_at }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    fn admin() -> AuthContext {
        AuthContext { user_id: UserId::new(), is_admin: true }
    }

    fn create_request(owner: Option<UserId>) -> CreateNodeRequest {
        CreateNodeRequest {
            name: "laptop".into(),
            is_lighthouse: false,
            public_ip: None,
            owner_user_id: owner,
            ip_version: IpVersion::Ipv4Only,
            os_type: OsType::Docker,
        }
    }

    #[tokio::test]
    async fn enrolling_a_node_under_another_owner_is_forbidden() {
        let state = test_state();
        let caller = AuthContext { user_id: UserId::new(), is_admin: false };
        let request = create_request(Some(UserId::new()));
        let err = create(State(state), caller, Json(request)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn enrolling_a_node_issues_its_first_token() {
        let state = test_state();
        let request = create_request(None);
        let Json(created) = create(State(state.clone()), admin(), Json(request)).await.unwrap();
        assert!(!created.token.is_empty());

        let tokens = state.storage.token.list_for_node(created.node.id).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_active);
        assert_eq!(tokens[0].value, created.token);
    }

    #[tokio::test]
    async fn list_filters_to_owned_nodes_for_non_admins() {
        let state = test_state();
        let owner = UserId::new();
        create(State(state.clone()), admin(), Json(create_request(Some(owner)))).await.unwrap();
        create(State(state.clone()), admin(), Json(create_request(None))).await.unwrap();

        let owner_ctx = AuthContext { user_id: owner, is_admin: false };
        let Json(owned) = list(State(state.clone()), owner_ctx).await.unwrap();
        assert_eq!(owned.len(), 1);

        let Json(all) = list(State(state), admin()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn update_replaces_groups_and_rulesets() {
        let state = test_state();
        let Json(created) = create(State(state.clone()), admin(), Json(create_request(None))).await.unwrap();

        let group_id = GroupId::new();
        let ruleset_id = FirewallRulesetId::new();
        let request = UpdateNodeRequest {
            is_blocked: Some(true),
            group_ids: Some(vec![group_id]),
            ruleset_ids: Some(vec![ruleset_id]),
        };
        let Json(updated) = update(State(state), admin(), Path(created.node.id), Json(request)).await.unwrap();
        assert!(updated.is_blocked);
        assert_eq!(updated.group_ids, vec![group_id]);
        assert_eq!(updated.ruleset_ids, vec![ruleset_id]);
    }

    #[tokio::test]
    async fn reissuing_a_token_revokes_the_old_one_and_keeps_it_active_next_door() {
        let state = test_state();
        let Json(created) = create(State(state.clone()), admin(), Json(create_request(None))).await.unwrap();

        let Json(reissued) = reissue_token(State(state.clone()), admin(), Path(created.node.id)).await.unwrap();
        assert_ne!(reissued.token, created.token);

        let tokens = state.storage.token.list_for_node(created.node.id).await.unwrap();
        assert_eq!(tokens.len(), 2);
        let old = tokens.iter().find(|t| t.id == reissued.old_token_id).unwrap();
        assert!(!old.is_active);
        let fresh = tokens.iter().find(|t| t.id == reissued.id).unwrap();
        assert!(fresh.is_active);
    }

    #[tokio::test]
    async fn docker_compose_substitutes_every_placeholder() {
        let state = test_state();
        let mut global = state.storage.settings.get_global().await.unwrap();
        global.docker_compose_template =
            "image: {{image}}\nenv:\n  TOKEN: {{token}}\n  URL: {{server_url}}\n  NAME: {{client_name}}\n  ID: {{client_id}}"
                .into();
        global.client_docker_image = "nebulaoss/nebula:latest".into();
        global.server_url = "https://fleet.example".into();
        state.storage.settings.put_global(global).await.unwrap();

        let Json(created) = create(State(state.clone()), admin(), Json(create_request(None))).await.unwrap();
        let rendered = docker_compose(State(state), admin(), Path(created.node.id)).await.unwrap();
        assert!(rendered.contains("nebulaoss/nebula:latest"));
        assert!(rendered.contains(&created.token));
        assert!(rendered.contains("https://fleet.example"));
        assert!(rendered.contains("laptop"));
        assert!(rendered.contains(&created.node.id.to_string()));
    }

    #[tokio::test]
    async fn create_enrollment_code_expires_fifteen_minutes_out() {
        let state = test_state();
        let Json(created) = create(State(state.clone()), admin(), Json(create_request(None))).await.unwrap();

        let before = Utc::now();
        let Json(code) = create_enrollment_code(State(state), admin(), Path(created.node.id)).await.unwrap();
        assert!(code.expires_at > before + chrono::Duration::minutes(14));
        assert!(code.expires_at <= before + chrono::Duration::minutes(15) + chrono::Duration::seconds(5));
        assert!(!code.code.is_empty());
    }
}
