//! `/v1/groups`, `/v1/firewall/*`, `/v1/permissions`, `/v1/user-groups`,
//! `/v1/client-permissions`, `/v1/users`: the fleet's access-control
//! surface (spec §6). Admin-only throughout -- even read access, since
//! these rows describe other users' grants.

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use nebula_core::{
    ClientPermission, ClientPermissionId, FirewallRule, FirewallRuleId, FirewallRuleset,
    FirewallRulesetId, Group, GroupId, NodeId, Permission, PermissionId, UserGroup, UserGroupId,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::auth::AuthContext;
use crate::error::ApiResult;
use crate::state::AppState;

// --- node groups ---

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

/// `POST /v1/groups`.
pub async fn create_group(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<CreateGroupRequest>,
) -> ApiResult<Json<Group>> {
    ctx.require_admin()?;
    let group = Group { id: GroupId::new(), name: request.name, created_at: Utc::now() };
    state.storage.group.create(group.clone()).await?;
    Ok(Json(group))
}

/// `GET /v1/groups`.
pub async fn list_groups(State(state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Vec<Group>>> {
    ctx.require_admin()?;
    Ok(Json(state.storage.group.list().await?))
}

/// `DELETE /v1/groups/{id}`.
pub async fn delete_group(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<GroupId>,
) -> ApiResult<axum::http::StatusCode> {
    ctx.require_admin()?;
    state.storage.group.delete(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// --- firewall rulesets and rules ---

#[derive(Debug, Deserialize)]
pub struct CreateRulesetRequest {
    pub name: String,
}

/// `POST /v1/firewall/rulesets`.
pub async fn create_ruleset(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<CreateRulesetRequest>,
) -> ApiResult<Json<FirewallRuleset>> {
    ctx.require_admin()?;
    let ruleset = FirewallRuleset { id: FirewallRulesetId::new(), name: request.name, created_at: Utc::now() };
    state.storage.firewall.create_ruleset(ruleset.clone()).await?;
    Ok(Json(ruleset))
}

/// `GET /v1/firewall/rulesets`.
pub async fn list_rulesets(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> ApiResult<Json<Vec<FirewallRuleset>>> {
    ctx.require_admin()?;
    Ok(Json(state.storage.firewall.list_rulesets().await?))
}

#[derive(Debug, Deserialize)]
pub struct AddRuleRequest {
    pub direction: nebula_core::FirewallDirection,
    pub proto: nebula_core::FirewallProto,
    pub port: String,
    pub host: Option<String>,
    pub cidr: Option<ipnet::Ipv4Net>,
    pub local_cidr: Option<ipnet::Ipv4Net>,
    pub ca_name: Option<String>,
    pub ca_sha: Option<String>,
    pub group: Option<String>,
    pub groups: Vec<String>,
}

/// `POST /v1/firewall/rulesets/{id}/rules`.
pub async fn add_rule(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(ruleset_id): Path<FirewallRulesetId>,
    Json(request): Json<AddRuleRequest>,
) -> ApiResult<Json<FirewallRule>> {
    ctx.require_admin()?;
    state.storage.firewall.get_ruleset(ruleset_id).await?;
    let rule = FirewallRule {
        id: FirewallRuleId::new(),
        ruleset_id,
        direction: request.direction,
        proto: request.proto,
        port: request.port,
        host: request.host,
        cidr: request.cidr,
        local_cidr: request.local_cidr,
        ca_name: request.ca_name,
        ca_sha: request.ca_sha,
        group: request.group,
        groups: request.groups,
    };
    state.storage.firewall.add_rule(rule.clone()).await?;
    Ok(Json(rule))
}

/// `GET /v1/firewall/rulesets/{id}/rules`.
pub async fn list_rules(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(ruleset_id): Path<FirewallRulesetId>,
) -> ApiResult<Json<Vec<FirewallRule>>> {
    ctx.require_admin()?;
    Ok(Json(state.storage.firewall.list_rules(ruleset_id).await?))
}

/// `DELETE /v1/firewall/rules/{id}`.
pub async fn remove_rule(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<FirewallRuleId>,
) -> ApiResult<axum::http::StatusCode> {
    ctx.require_admin()?;
    state.storage.firewall.remove_rule(id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

// --- permissions ---

#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub resource: String,
    pub action: String,
}

/// `POST /v1/permissions`.
pub async fn create_permission(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<CreatePermissionRequest>,
) -> ApiResult<Json<Permission>> {
    ctx.require_admin()?;
    let permission = Permission { id: PermissionId::new(), resource: request.resource, action: request.action };
    state.storage.permission.create(permission.clone()).await?;
    Ok(Json(permission))
}

/// `GET /v1/permissions`.
pub async fn list_permissions(State(state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Vec<Permission>>> {
    ctx.require_admin()?;
    Ok(Json(state.storage.permission.list().await?))
}

// --- admin user groups ---

#[derive(Debug, Deserialize)]
pub struct CreateUserGroupRequest {
    pub name: String,
    pub is_admin: bool,
}

/// `POST /v1/user-groups`.
pub async fn create_user_group(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<CreateUserGroupRequest>,
) -> ApiResult<Json<UserGroup>> {
    ctx.require_admin()?;
    let group = UserGroup {
        id: UserGroupId::new(),
        name: request.name,
        is_admin: request.is_admin,
        user_ids: Vec::new(),
        permission_ids: Vec::new(),
        created_at: Utc::now(),
    };
    state.storage.user_group.create(group.clone()).await?;
    Ok(Json(group))
}

/// `GET /v1/user-groups`.
pub async fn list_user_groups(State(state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Vec<UserGroup>>> {
    ctx.require_admin()?;
    Ok(Json(state.storage.user_group.list().await?))
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub user_id: UserId,
}

/// `POST /v1/user-groups/{id}/users`.
pub async fn add_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<UserGroupId>,
    Json(request): Json<AddUserRequest>,
) -> ApiResult<Json<UserGroup>> {
    ctx.require_admin()?;
    state.storage.user_group.add_user(group_id, request.user_id).await?;
    Ok(Json(state.storage.user_group.get(group_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetPermissionsRequest {
    pub permission_ids: Vec<PermissionId>,
}

/// `PUT /v1/user-groups/{id}/permissions`.
pub async fn set_permissions(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<UserGroupId>,
    Json(request): Json<SetPermissionsRequest>,
) -> ApiResult<Json<UserGroup>> {
    ctx.require_admin()?;
    state.storage.user_group.set_permissions(group_id, request.permission_ids).await?;
    Ok(Json(state.storage.user_group.get(group_id).await?))
}

/// `GET /v1/users`: there is no `User` repository (spec's data model only
/// ever names an opaque `UserId`, see `DESIGN.md`), so this is a derived
/// listing of every distinct `UserId` that appears in some `UserGroup`.
pub async fn list_users(State(state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Vec<UserId>>> {
    ctx.require_admin()?;
    let groups = state.storage.user_group.list().await?;
    let ids: BTreeSet<UserId> = groups.into_iter().flat_map(|g| g.user_ids).collect();
    Ok(Json(ids.into_iter().collect()))
}

// --- per-node client permission grants ---

#[derive(Debug, Deserialize)]
pub struct UpsertClientPermissionRequest {
    pub user_id: UserId,
    pub can_view: bool,
    pub can_update: bool,
    pub can_download_config: bool,
    pub can_view_token: bool,
    pub can_download_docker_config: bool,
}

/// `PUT /v1/clients/{id}/permissions`.
pub async fn upsert_client_permission(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(node_id): Path<NodeId>,
    Json(request): Json<UpsertClientPermissionRequest>,
) -> ApiResult<Json<ClientPermission>> {
    ctx.require_admin()?;
    let existing = state.storage.client_permission.get(request.user_id, node_id).await?;
    let grant = ClientPermission {
        id: existing.map_or_else(ClientPermissionId::new, |g| g.id),
        node_id,
        user_id: request.user_id,
        can_view: request.can_view,
        can_update: request.can_update,
        can_download_config: request.can_download_config,
        can_view_token: request.can_view_token,
        can_download_docker_config: request.can_download_docker_config,
    };
    state.storage.client_permission.upsert(grant).await?;
    Ok(Json(grant))
}

/// `GET /v1/clients/{id}/permissions`.
pub async fn list_client_permissions(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(node_id): Path<NodeId>,
) -> ApiResult<Json<Vec<ClientPermission>>> {
    ctx.require_admin()?;
    Ok(Json(state.storage.client_permission.list_for_node(node_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    fn admin() -> AuthContext {
        AuthContext { user_id: UserId::new(), is_admin: true }
    }

    fn member() -> AuthContext {
        AuthContext { user_id: UserId::new(), is_admin: false }
    }

    #[tokio::test]
    async fn non_admin_cannot_list_user_groups() {
        let state = test_state();
        let err = list_user_groups(State(state), member()).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn users_are_derived_from_user_group_membership() {
        let state = test_state();
        let Json(group) = create_user_group(
            State(state.clone()),
            admin(),
            Json(CreateUserGroupRequest { name: "operators".into(), is_admin: false }),
        )
        .await
        .unwrap();

        let alice = UserId::new();
        let bob = UserId::new();
        add_user(State(state.clone()), admin(), Path(group.id), Json(AddUserRequest { user_id: alice }))
            .await
            .unwrap();
        add_user(State(state.clone()), admin(), Path(group.id), Json(AddUserRequest { user_id: bob })).await.unwrap();

        let Json(users) = list_users(State(state), admin()).await.unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.contains(&alice));
        assert!(users.contains(&bob));
    }

    #[tokio::test]
    async fn firewall_rule_requires_an_existing_ruleset() {
        let state = test_state();
        let request = AddRuleRequest {
            direction: nebula_core::FirewallDirection::Inbound,
            proto: nebula_core::FirewallProto::Tcp,
            port: "22".into(),
            host: None,
            cidr: None,
            local_cidr: None,
            ca_name: None,
            ca_sha: None,
            group: None,
            groups: Vec::new(),
        };
        let err =
            add_rule(State(state), admin(), Path(FirewallRulesetId::new()), Json(request)).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ruleset_rule_round_trip() {
        let state = test_state();
        let Json(ruleset) = create_ruleset(State(state.clone()), admin(), Json(CreateRulesetRequest { name: "base".into() }))
            .await
            .unwrap();

        let request = AddRuleRequest {
            direction: nebula_core::FirewallDirection::Outbound,
            proto: nebula_core::FirewallProto::Any,
            port: "any".into(),
            host: None,
            cidr: None,
            local_cidr: None,
            ca_name: None,
            ca_sha: None,
            group: Some("servers".into()),
            groups: Vec::new(),
        };
        add_rule(State(state.clone()), admin(), Path(ruleset.id), Json(request)).await.unwrap();

        let Json(rules) = list_rules(State(state), admin(), Path(ruleset.id)).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].group.as_deref(), Some("servers"));
    }

    #[tokio::test]
    async fn upserting_a_client_permission_twice_keeps_the_same_id() {
        let state = test_state();
        let node_id = NodeId::new();
        let user_id = UserId::new();
        let request = UpsertClientPermissionRequest {
            user_id,
            can_view: true,
            can_update: false,
            can_download_config: false,
            can_view_token: false,
            can_download_docker_config: false,
        };
        let Json(first) =
            upsert_client_permission(State(state.clone()), admin(), Path(node_id), Json(request)).await.unwrap();

        let second_request = UpsertClientPermissionRequest {
            user_id,
            can_view: true,
            can_update: true,
            can_download_config: false,
            can_view_token: false,
            can_download_docker_config: false,
        };
        let Json(second) =
            upsert_client_permission(State(state.clone()), admin(), Path(node_id), Json(second_request))
                .await
                .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.can_update);

        let Json(listed) = list_client_permissions(State(state), admin(), Path(node_id)).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
