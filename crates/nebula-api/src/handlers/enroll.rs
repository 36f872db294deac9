//! `GET /v1/enroll/{code}`: the one unauthenticated client-facing route
//! besides the GitHub webhook surface, so it sits behind
//! [`crate::rate_limit::limit_public`] in the router. Trades a short-lived,
//! single-use code for the node's active bearer token, letting an operator
//! hand a new device something that expires instead of a long-lived secret.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    token: String,
}

pub async fn redeem(State(state): State<AppState>, Path(code): Path<String>) -> ApiResult<Json<EnrollResponse>> {
    let record = state
        .storage
        .enrollment
        .get_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "unknown enrollment code"))?;
    if !record.is_valid_at(Utc::now()) {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "enrollment code expired or already used"));
    }
    let token = state
        .storage
        .token
        .list_for_node(record.node_id)
        .await?
        .into_iter()
        .find(|t| t.is_active)
        .ok_or_else(|| {
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "node has no active token to hand out")
        })?;
    state.storage.enrollment.mark_used(record.id).await?;
    Ok(Json(EnrollResponse { token: token.value }))
}

#[cfg(test)]
mod tests {
    use nebula_core::{EnrollmentCode, EnrollmentCodeId, Node, NodeId};

    use super::*;
    use crate::state::test_state;

    fn sample_node() -> Node {
        let now = Utc::now();
        Node {
            id: NodeId::new(),
            name: "laptop".into(),
            is_lighthouse: false,
            public_ip: None,
            is_blocked: false,
            owner_user_id: None,
            ip_version: nebula_core::IpVersion::Ipv4Only,
            os_type: nebula_core::OsType::Docker,
            group_ids: Vec::new(),
            ruleset_ids: Vec::new(),
            client_version: None,
            nebula_version: None,
            config_last_changed_at: now,
            last_config_download_at: None,
            last_version_report_at: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let state = test_state();
        let err = redeem(State(state), Path("no-such-code".into())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let state = test_state();
        let node = sample_node();
        state.storage.node.create(node.clone()).await.unwrap();
        let code = EnrollmentCode {
            id: EnrollmentCodeId::new(),
            node_id: node.id,
            code: "expired-code".into(),
            expires_at: Utc::now() - chrono::Duration::minutes(1),
            used_at: None,
        };
        state.storage.enrollment.create(code).await.unwrap();

        let err = redeem(State(state), Path("expired-code".into())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn valid_code_with_no_active_token_is_unavailable() {
        let state = test_state();
        let node = sample_node();
        state.storage.node.create(node.clone()).await.unwrap();
        let code = EnrollmentCode {
            id: EnrollmentCodeId::new(),
            node_id: node.id,
            code: "fresh-code".into(),
            expires_at: Utc::now() + chrono::Duration::minutes(15),
            used_at: None,
        };
        state.storage.enrollment.create(code).await.unwrap();

        let err = redeem(State(state), Path("fresh-code".into())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn valid_code_redeems_the_nodes_active_token_once() {
        let state = test_state();
        let node = sample_node();
        state.storage.node.create(node.clone()).await.unwrap();
        let issued = state.token_manager.issue(node.id, None).await.unwrap();
        let code = EnrollmentCode {
            id: EnrollmentCodeId::new(),
            node_id: node.id,
            code: "good-code".into(),
            expires_at: Utc::now() + chrono::Duration::minutes(15),
            used_at: None,
        };
        state.storage.enrollment.create(code).await.unwrap();

        let Json(response) = redeem(State(state.clone()), Path("good-code".into())).await.unwrap();
        assert_eq!(response.token, issued.value);

        let err = redeem(State(state), Path("good-code".into())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
