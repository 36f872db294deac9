//! `/v1/ip-pools[/...]`, `/v1/ip-groups[/...]`: overlay address-space
//! administration (spec §4.2, §6). Admin-only; allocation itself happens
//! implicitly from `client_config` rather than through this surface.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use ipnet::Ipv4Net;
use nebula_core::{IpGroup, IpGroupId, IpPool, IpPoolId};
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IpPoolResponse {
    pub id: IpPoolId,
    pub cidr: String,
    pub description: Option<String>,
}

impl From<IpPool> for IpPoolResponse {
    fn from(pool: IpPool) -> Self {
        Self { id: pool.id, cidr: pool.cidr.to_string(), description: pool.description }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateIpPoolRequest {
    pub cidr: String,
    pub description: Option<String>,
}

/// `POST /v1/ip-pools`.
pub async fn create_pool(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<CreateIpPoolRequest>,
) -> ApiResult<Json<IpPoolResponse>> {
    ctx.require_admin()?;
    let cidr: Ipv4Net = request
        .cidr
        .parse()
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "malformed CIDR"))?;
    let pool = IpPool { id: IpPoolId::new(), cidr, description: request.description, created_at: Utc::now() };
    state.storage.ipam.create_pool(pool.clone()).await?;
    Ok(Json(pool.into()))
}

/// `GET /v1/ip-pools`.
pub async fn list_pools(State(state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Vec<IpPoolResponse>>> {
    ctx.require_admin()?;
    let pools = state.storage.ipam.list_pools().await?;
    Ok(Json(pools.into_iter().map(IpPoolResponse::from).collect()))
}

/// `GET /v1/ip-pools/{id}`.
pub async fn get_pool(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<IpPoolId>,
) -> ApiResult<Json<IpPoolResponse>> {
    ctx.require_admin()?;
    let pool = state.storage.ipam.get_pool(id).await?;
    Ok(Json(pool.into()))
}

#[derive(Debug, Serialize)]
pub struct IpGroupResponse {
    pub id: IpGroupId,
    pub pool_id: IpPoolId,
    pub name: String,
    pub start: std::net::Ipv4Addr,
    pub end: std::net::Ipv4Addr,
}

impl From<IpGroup> for IpGroupResponse {
    fn from(group: IpGroup) -> Self {
        Self { id: group.id, pool_id: group.pool_id, name: group.name, start: group.start, end: group.end }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateIpGroupRequest {
    pub name: String,
    pub start: std::net::Ipv4Addr,
    pub end: std::net::Ipv4Addr,
}

/// `POST /v1/ip-pools/{id}/groups`: reserve a sub-range within a pool for
/// a subset of nodes.
pub async fn create_group(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(pool_id): Path<IpPoolId>,
    Json(request): Json<CreateIpGroupRequest>,
) -> ApiResult<Json<IpGroupResponse>> {
    ctx.require_admin()?;
    // Ensure the pool exists before attaching a sub-range to it.
    state.storage.ipam.get_pool(pool_id).await?;
    if request.start > request.end {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "group start must not exceed end"));
    }
    let group = IpGroup { id: IpGroupId::new(), pool_id, name: request.name, start: request.start, end: request.end };
    state.storage.ipam.create_group(group.clone()).await?;
    Ok(Json(group.into()))
}

/// `GET /v1/ip-pools/{id}/groups`.
pub async fn list_groups(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(pool_id): Path<IpPoolId>,
) -> ApiResult<Json<Vec<IpGroupResponse>>> {
    ctx.require_admin()?;
    let groups = state.storage.ipam.list_groups(pool_id).await?;
    Ok(Json(groups.into_iter().map(IpGroupResponse::from).collect()))
}
