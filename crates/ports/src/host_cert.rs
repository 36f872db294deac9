//! Host certificate repository port.

use async_trait::async_trait;
use nebula_core::{HostCert, HostCertId, NodeId};
use nebula_error::Result;

/// Persistence for issued Nebula host certificates.
#[async_trait]
pub trait HostCertRepo: Send + Sync {
    /// Persist a newly issued certificate.
    async fn create(&self, cert: HostCert) -> Result<()>;

    /// Fetch a certificate by ID.
    async fn get(&self, id: HostCertId) -> Result<HostCert>;

    /// The most recently issued non-revoked certificate for a node, if any
    /// -- used by `CertManager` to decide whether it can be reused.
    async fn latest_non_revoked_for_node(&self, node_id: NodeId) -> Result<Option<HostCert>>;

    /// All certificates issued for a node, newest first.
    async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<HostCert>>;

    /// Mark a certificate revoked. Terminal; revocation is the retirement
    /// path, certs are never deleted.
    async fn revoke(&self, id: HostCertId) -> Result<()>;

    /// Fingerprints of every revoked-but-still-validity-windowed cert
    /// (`revoked && not_after > now && fingerprint.is_some()`), the
    /// blocklist distributed to every node.
    async fn active_revoked_fingerprints(&self) -> Result<Vec<String>>;
}
