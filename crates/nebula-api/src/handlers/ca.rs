//! `/v1/ca[/...]`: certificate authority lifecycle (spec §4.1, §6).
//! Every route here is admin-only -- CA material is fleet-wide, not
//! node-scoped, so there's no owner path to fall back to.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use nebula_core::{CaId, CertVersion};
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CaResponse {
    pub id: CaId,
    pub name: String,
    pub cert_version: CertVersion,
    pub is_active: bool,
    pub is_previous: bool,
    pub can_sign: bool,
    pub include_in_config: bool,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl From<nebula_core::Ca> for CaResponse {
    fn from(ca: nebula_core::Ca) -> Self {
        Self {
            id: ca.id,
            name: ca.name,
            cert_version: ca.cert_version,
            is_active: ca.is_active,
            is_previous: ca.is_previous,
            can_sign: ca.can_sign,
            include_in_config: ca.include_in_config,
            not_before: ca.not_before,
            not_after: ca.not_after,
        }
    }
}

/// `GET /v1/ca`: every CA, newest first.
pub async fn list(State(state): State<AppState>, ctx: AuthContext) -> ApiResult<Json<Vec<CaResponse>>> {
    ctx.require_admin()?;
    let cas = state.storage.ca.list().await?;
    Ok(Json(cas.into_iter().map(CaResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CreateCaRequest {
    pub name: String,
    pub cert_version: CertVersion,
}

/// `POST /v1/ca/create`: mint a brand-new self-signed root, demoting any
/// existing signing CA of the same `cert_version` (spec §4.1). A v2 CA
/// additionally requires the fleet's configured Nebula version to support
/// it, hence the lookup against `GlobalSettings`.
pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<CreateCaRequest>,
) -> ApiResult<Json<CaResponse>> {
    ctx.require_admin()?;
    let global = state.storage.settings.get_global().await?;
    let ca = state
        .cert_manager
        .create_ca(&request.name, request.cert_version, global.nebula_version.as_ref())
        .await?;
    Ok(Json(ca.into()))
}

#[derive(Debug, Deserialize)]
pub struct ImportCaRequest {
    pub name: String,
    pub cert_pem: String,
    pub key_pem: Option<String>,
    pub cert_version: CertVersion,
}

/// `POST /v1/ca/import`: bring in an existing CA. A key makes it eligible
/// to sign; without one it's trust-only (spec §4.1's "public CA import").
pub async fn import(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<ImportCaRequest>,
) -> ApiResult<Json<CaResponse>> {
    ctx.require_admin()?;
    let ca = match request.key_pem {
        Some(key_pem) => {
            state
                .cert_manager
                .import_existing_ca(&request.name, request.cert_pem, key_pem, request.cert_version)
                .await?
        }
        None => {
            state.cert_manager.import_public_ca(&request.name, request.cert_pem, request.cert_version).await?
        }
    };
    Ok(Json(ca.into()))
}

/// `POST /v1/ca/{id}/set-signing`: promote a CA to `can_sign = true`. There
/// is no matching "unset" route -- a CA stops signing by being demoted when
/// its successor is created, not by direct toggle.
pub async fn set_signing(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<CaId>,
) -> ApiResult<Json<CaResponse>> {
    ctx.require_admin()?;
    let mut ca = state.storage.ca.get(id).await?;
    if !ca.is_active {
        return Err(ApiError::new(StatusCode::CONFLICT, "cannot promote an inactive CA to signing"));
    }
    ca.can_sign = true;
    state.storage.ca.create(ca.clone()).await?;
    Ok(Json(ca.into()))
}

/// `DELETE /v1/ca/{id}`: rejects a currently signing CA with 409, per
/// `CaRepo::delete`'s contract.
pub async fn delete(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<CaId>,
) -> ApiResult<StatusCode> {
    ctx.require_admin()?;
    let ca = state.storage.ca.get(id).await?;
    if ca.can_sign {
        return Err(ApiError::new(StatusCode::CONFLICT, "cannot delete a currently signing CA"));
    }
    state.storage.ca.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use nebula_core::UserId;

    use super::*;
    use crate::state::test_state;

    fn admin() -> AuthContext {
        AuthContext { user_id: UserId::new(), is_admin: true }
    }

    fn member() -> AuthContext {
        AuthContext { user_id: UserId::new(), is_admin: false }
    }

    fn sample_ca(can_sign: bool) -> nebula_core::Ca {
        let now = Utc::now();
        nebula_core::Ca {
            id: CaId::new(),
            name: "test CA".into(),
            cert_pem: "pem".into(),
            key_pem: Some("key".into()),
            not_before: now,
            not_after: now + chrono::Duration::days(365),
            is_active: true,
            is_previous: false,
            can_sign,
            include_in_config: true,
            cert_version: CertVersion::V1,
            nebula_version: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn non_admin_cannot_list_cas() {
        let state = test_state();
        let err = list(State(state), member()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn set_signing_rejects_an_inactive_ca() {
        let state = test_state();
        let mut ca = sample_ca(false);
        ca.is_active = false;
        state.storage.ca.create(ca.clone()).await.unwrap();

        let err = set_signing(State(state), admin(), Path(ca.id)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn set_signing_promotes_an_active_ca() {
        let state = test_state();
        let ca = sample_ca(false);
        state.storage.ca.create(ca.clone()).await.unwrap();

        let Json(promoted) = set_signing(State(state), admin(), Path(ca.id)).await.unwrap();
        assert!(promoted.can_sign);
    }

    #[tokio::test]
    async fn delete_rejects_a_currently_signing_ca() {
        let state = test_state();
        let ca = sample_ca(true);
        state.storage.ca.create(ca.clone()).await.unwrap();

        let err = delete(State(state), admin(), Path(ca.id)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn delete_removes_a_non_signing_ca() {
        let state = test_state();
        let ca = sample_ca(false);
        state.storage.ca.create(ca.clone()).await.unwrap();

        delete(State(state.clone()), admin(), Path(ca.id)).await.unwrap();
        let Json(remaining) = list(State(state), admin()).await.unwrap();
        assert!(remaining.is_empty());
    }
}
