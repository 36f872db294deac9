//! `GET /v1/healthz`, `GET /v1/version`.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// Liveness probe; never touches a repository.
pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    managed_nebula_version: String,
    nebula_version: Option<String>,
}

/// This build's version alongside the fleet's configured Nebula version,
/// used by the node agent to decide whether to self-update (spec §4.5
/// step 2).
pub async fn version(State(state): State<AppState>) -> crate::error::ApiResult<Json<VersionResponse>> {
    let global = state.storage.settings.get_global().await?;
    Ok(Json(VersionResponse {
        managed_nebula_version: state.managed_nebula_version.clone(),
        nebula_version: global.nebula_version.map(|v| v.to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    #[tokio::test]
    async fn healthz_reports_ok() {
        let Json(body) = healthz().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn version_reports_none_nebula_version_before_any_settings_write() {
        let state = test_state();
        let Json(body) = version(State(state)).await.unwrap();
        assert!(body.nebula_version.is_none());
    }
}
