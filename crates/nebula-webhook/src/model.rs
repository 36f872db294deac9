//! Request/response bodies for the GitHub secret-scanning partner surface.

use serde::{Deserialize, Serialize};

/// `GET /.well-known/secret-scanning.json` pattern set entry. The document
/// served at that path is a one-element JSON array of this type.
#[derive(Debug, Clone, Serialize)]
pub struct PatternEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub pattern: String,
}

/// One row of a verify or revoke request body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenMatch {
    pub token: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One row GitHub renders in its dashboard when a token matches.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyResult {
    pub token: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub url: String,
    pub is_active: bool,
}

/// `POST /v1/github/secret-scanning/revoke` response.
#[derive(Debug, Clone, Serialize)]
pub struct RevokeResponse {
    pub revoked_count: usize,
}
