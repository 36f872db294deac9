//! Bearer-JWT authentication and node-scoped authorization.
//!
//! Spec.md treats "session middleware" as an external collaborator and this
//! data model has no `User`/password entity (only an opaque `UserId` and
//! `UserGroup.user_ids`, see `DESIGN.md`). So this crate never issues a
//! token: it only validates one presented by an already-authenticated
//! caller, decoding `sub`/`is_admin` claims an external identity provider
//! is expected to mint. `GET/POST/...  /v1/clients[/...]` and friends pull
//! an [`AuthContext`] out of the request; `/v1/client/config` is the one
//! exception, since its token travels in the body, not the header (spec
//! §4.3 step 1), and is resolved directly against `TokenManager`.

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, Validation, decode};
use nebula_core::{Node, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: UserId,
    is_admin: bool,
    #[allow(dead_code)]
    exp: usize,
}

/// The authenticated caller's identity and admin flag, decoded from a
/// bearer JWT.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    /// The caller's opaque user identifier.
    pub user_id: UserId,
    /// Whether the caller belongs to an admin [`nebula_core::UserGroup`].
    pub is_admin: bool,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "missing Authorization header"))?;
        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::new(StatusCode::UNAUTHORIZED, "Authorization header must be a bearer token")
        })?;
        let data = decode::<Claims>(token, &state.jwt_decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|_| ApiError::new(StatusCode::UNAUTHORIZED, "invalid or expired bearer token"))?;
        Ok(Self { user_id: data.claims.sub, is_admin: data.claims.is_admin })
    }
}

impl AuthContext {
    /// Reject unless the caller is an admin.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::new(StatusCode::FORBIDDEN, "admin privileges required"))
        }
    }
}

/// Which facet of a node a caller is trying to exercise, mirroring
/// [`nebula_core::ClientPermission`]'s boolean grants.
#[derive(Debug, Clone, Copy)]
pub enum NodeAccess {
    /// Read the node's metadata.
    View,
    /// Mutate the node (blocked state, groups, rulesets).
    Update,
    /// Fetch its rendered config bundle.
    DownloadConfig,
    /// See its token value rather than a preview.
    ViewToken,
    /// Fetch its docker-compose file.
    DownloadDockerConfig,
}

/// Admin-or-owner-or-permitted gate for one node (spec §6: "admin/owner/
/// permitted"). Admins and the node's own owner always pass; everyone else
/// needs an explicit [`nebula_core::ClientPermission`] grant for the
/// requested facet.
pub async fn authorize_node(
    state: &AppState,
    ctx: &AuthContext,
    node: &Node,
    access: NodeAccess,
) -> Result<(), ApiError> {
    if ctx.is_admin || node.owner_user_id == Some(ctx.user_id) {
        return Ok(());
    }
    let grant = state.storage.client_permission.get(ctx.user_id, node.id).await.map_err(ApiError::from)?;
    let allowed = grant.is_some_and(|g| match access {
        NodeAccess::View => g.can_view,
        NodeAccess::Update => g.can_update,
        NodeAccess::DownloadConfig => g.can_download_config,
        NodeAccess::ViewToken => g.can_view_token,
        NodeAccess::DownloadDockerConfig => g.can_download_docker_config,
    });
    if allowed {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::FORBIDDEN, "insufficient permission for this node"))
    }
}
