//! Certificate authority repository port.

use async_trait::async_trait;
use nebula_core::{Ca, CaId, CertVersion};
use nebula_error::Result;

/// Persistence for certificate authorities.
#[async_trait]
pub trait CaRepo: Send + Sync {
    /// Persist a newly created or imported CA.
    async fn create(&self, ca: Ca) -> Result<()>;

    /// Fetch a CA by ID.
    async fn get(&self, id: CaId) -> Result<Ca>;

    /// The CA currently eligible to sign new host certs of `cert_version`
    /// (`is_active && can_sign`), if one exists.
    async fn active_signing(&self, cert_version: CertVersion) -> Result<Option<Ca>>;

    /// All CAs with `include_in_config && not_after > now`, the bundle
    /// `ConfigBuilder` distributes to nodes.
    async fn included_in_config(&self) -> Result<Vec<Ca>>;

    /// All CAs, newest first.
    async fn list(&self) -> Result<Vec<Ca>>;

    /// Flip `id` to `is_previous = true, include_in_config = true` because a
    /// successor CA of the same `cert_version` was just created.
    async fn demote(&self, id: CaId) -> Result<()>;

    /// Stop distributing and retire `id` entirely (`is_active = false`, kept
    /// for historical reference) after its overlap window elapses.
    async fn deactivate(&self, id: CaId) -> Result<()>;

    /// Remove a CA outright. Callers must reject this for a currently
    /// signing CA (`ErrorKind::Conflict`).
    async fn delete(&self, id: CaId) -> Result<()>;
}
