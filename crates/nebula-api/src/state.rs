//! Shared application state: the repositories and domain services every
//! handler needs, assembled once in `src/bin/nebula-server.rs` and cloned
//! (cheaply -- every field is an `Arc` or wraps one) into each request.

use std::sync::Arc;

use jsonwebtoken::DecodingKey;
use nebula_cert::{CertCli, CertManager, CertManagerConfig};
use nebula_ipam::IpAllocator;
use nebula_storage::Storage;
use nebula_token::TokenManager;
use nebula_webhook::WebhookService;

/// Everything a handler needs to serve one request.
#[derive(Clone)]
pub struct AppState {
    /// The repository facade (in-memory today; a Postgres driver would
    /// plug in here without touching a single handler).
    pub storage: Storage,
    /// CA lifecycle and host-cert issuance.
    pub cert_manager: Arc<CertManager>,
    /// Overlay-address allocation.
    pub ip_allocator: Arc<IpAllocator>,
    /// Bearer-token issuance and lookup.
    pub token_manager: Arc<TokenManager>,
    /// The GitHub secret-scanning partner surface, mounted separately by
    /// [`crate::router::build_router`] but constructed here so every piece
    /// of domain wiring lives in one place.
    pub webhook: Arc<WebhookService>,
    /// Key used to validate bearer JWTs presented by administrative
    /// callers. Issuing sessions is out of scope here (an external
    /// collaborator, see `DESIGN.md`); this crate only verifies them.
    pub jwt_decoding_key: Arc<DecodingKey>,
    /// This build's own version, returned by `GET /v1/version` alongside
    /// the fleet's configured Nebula version.
    pub managed_nebula_version: String,
}

impl AppState {
    /// Wire every domain service over a shared [`Storage`].
    #[must_use]
    pub fn new(
        storage: Storage,
        cert_cli_path: impl Into<String>,
        jwt_secret: &[u8],
        managed_nebula_version: impl Into<String>,
    ) -> Self {
        let cert_manager = CertManager::new(
            storage.ca.clone(),
            storage.host_cert.clone(),
            CertCli::new(cert_cli_path.into()),
            CertManagerConfig::default(),
        );
        let ip_allocator = IpAllocator::new(storage.ipam.clone(), storage.settings.clone());
        let token_manager = TokenManager::new(storage.token.clone(), storage.settings.clone());
        let webhook = WebhookService::new(
            storage.token.clone(),
            storage.node.clone(),
            storage.settings.clone(),
            storage.webhook_audit.clone(),
        );
        Self {
            storage,
            cert_manager: Arc::new(cert_manager),
            ip_allocator: Arc::new(ip_allocator),
            token_manager: Arc::new(token_manager),
            webhook: Arc::new(webhook),
            jwt_decoding_key: Arc::new(DecodingKey::from_secret(jwt_secret)),
            managed_nebula_version: managed_nebula_version.into(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    AppState::new(Storage::in_memory(), "nebula-cert", b"test-secret-at-least-this-long", "0.1.0-test")
}
