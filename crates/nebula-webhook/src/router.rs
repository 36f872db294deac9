//! Axum router for the three public GitHub secret-scanning endpoints.
//!
//! Mounted by `nebula-api` alongside the authenticated surface; these three
//! routes are public by design (spec §4.4), so the error-to-status mapping
//! that elsewhere happens once at the `nebula-api` boundary is done locally
//! here instead.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use nebula_error::{ErrorKind, NebulaError};

use crate::model::{RevokeResponse, TokenMatch, VerifyResult};
use crate::service::WebhookService;

/// Build the router. The caller nests this under its own prefix.
#[must_use]
pub fn router(service: Arc<WebhookService>) -> Router {
    Router::new()
        .route("/.well-known/secret-scanning.json", get(pattern_document))
        .route("/v1/github/secret-scanning/verify", post(verify))
        .route("/v1/github/secret-scanning/revoke", post(revoke))
        .with_state(service)
}

fn status_for(err: &NebulaError) -> StatusCode {
    match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::External | ErrorKind::Io => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn err_response(err: NebulaError) -> (StatusCode, String) {
    let status = status_for(&err);
    tracing::warn!(kind = %err.kind(), "webhook request rejected");
    (status, err.to_string())
}

async fn pattern_document(
    State(service): State<Arc<WebhookService>>,
) -> Result<Json<Vec<crate::model::PatternEntry>>, (StatusCode, String)> {
    service.pattern_entries().await.map(Json).map_err(err_response)
}

fn signature_header(headers: &HeaderMap) -> Option<&str> {
    headers.get("X-Hub-Signature-256").and_then(|v| v.to_str().ok())
}

async fn verify(
    State(service): State<Arc<WebhookService>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Vec<VerifyResult>>, (StatusCode, String)> {
    service.verify_signature(&body, signature_header(&headers)).await.map_err(err_response)?;
    let matches: Vec<TokenMatch> =
        serde_json::from_slice(&body).map_err(|e| err_response(NebulaError::validation(e.to_string())))?;
    service.verify(&matches).await.map(Json).map_err(err_response)
}

async fn revoke(
    State(service): State<Arc<WebhookService>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<RevokeResponse>, (StatusCode, String)> {
    service.verify_signature(&body, signature_header(&headers)).await.map_err(err_response)?;
    let matches: Vec<TokenMatch> =
        serde_json::from_slice(&body).map_err(|e| err_response(NebulaError::validation(e.to_string())))?;
    service.revoke(&matches).await.map(Json).map_err(err_response)
}
