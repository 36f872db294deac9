#![warn(missing_docs)]

//! # Nebula Storage
//!
//! Wires the port traits defined in `nebula-ports` to a concrete driver and
//! hands every HTTP handler and background task the same set of `Arc<dyn
//! Trait>` handles, so a driver swap (in-memory today, Postgres later) never
//! touches call sites.

use std::sync::Arc;

use nebula_ports::{
    CaRepo, ClientPermissionRepo, EnrollmentRepo, FirewallRepo, GroupRepo, HostCertRepo, IpamRepo,
    NodeRepo, PermissionRepo, SettingsRepo, TokenRepo, UserGroupRepo, WebhookAuditRepo,
};
use nebula_repo_memory::MemoryStore;

/// The full set of repository ports the rest of the workspace depends on.
///
/// Every field is an `Arc<dyn Trait>` so callers never need to know which
/// driver backs a given deployment.
#[derive(Clone)]
pub struct Storage {
    /// Certificate authority persistence.
    pub ca: Arc<dyn CaRepo>,
    /// Enrolled node persistence.
    pub node: Arc<dyn NodeRepo>,
    /// Client token persistence.
    pub token: Arc<dyn TokenRepo>,
    /// Issued host certificate persistence.
    pub host_cert: Arc<dyn HostCertRepo>,
    /// IP pool/group/assignment persistence.
    pub ipam: Arc<dyn IpamRepo>,
    /// Node group persistence.
    pub group: Arc<dyn GroupRepo>,
    /// Firewall ruleset/rule persistence.
    pub firewall: Arc<dyn FirewallRepo>,
    /// Permission definition persistence.
    pub permission: Arc<dyn PermissionRepo>,
    /// Admin user-group persistence.
    pub user_group: Arc<dyn UserGroupRepo>,
    /// Per-`(user, node)` fine-grained permission grant persistence.
    pub client_permission: Arc<dyn ClientPermissionRepo>,
    /// Fleet-wide settings persistence.
    pub settings: Arc<dyn SettingsRepo>,
    /// Enrollment-code persistence.
    pub enrollment: Arc<dyn EnrollmentRepo>,
    /// GitHub secret-scanning webhook audit trail.
    pub webhook_audit: Arc<dyn WebhookAuditRepo>,
}

impl Storage {
    /// Build a `Storage` backed by the `DashMap`-based in-memory driver.
    ///
    /// This is the default for the reference deployment: state does not
    /// survive a restart, which is acceptable for the single-process control
    /// plane this workspace ships.
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            ca: store.clone(),
            node: store.clone(),
            token: store.clone(),
            host_cert: store.clone(),
            ipam: store.clone(),
            group: store.clone(),
            firewall: store.clone(),
            permission: store.clone(),
            user_group: store.clone(),
            client_permission: store.clone(),
            settings: store.clone(),
            enrollment: store.clone(),
            webhook_audit: store,
        }
    }
}

/// Extension point for a Postgres-backed driver.
///
/// spec.md §1 treats schema and migrations as an external collaborator; this
/// workspace ships only the in-memory driver. A Postgres implementation
/// would provide its own type implementing every trait in `nebula-ports`
/// and construct a [`Storage`] from it the same way [`Storage::in_memory`]
/// does, likely behind a connection pool rather than a single `Arc`.
#[cfg(feature = "postgres")]
pub mod postgres {
    use nebula_error::{NebulaError, Result};

    use super::Storage;

    /// Not implemented. Reserved so downstream deployments can feature-gate
    /// on `nebula-storage/postgres` without a breaking API change once a
    /// real driver lands.
    ///
    /// # Errors
    /// Always returns `ErrorKind::Internal`.
    pub async fn connect(_pool: &sqlx::PgPool) -> Result<Storage> {
        Err(NebulaError::internal(
            "postgres storage driver is not implemented; see DESIGN.md",
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use nebula_core::{Ca, CaId};

    use super::*;

    #[tokio::test]
    async fn in_memory_storage_round_trips_through_every_port() {
        let storage = Storage::in_memory();
        let ca = Ca {
            id: CaId::new(),
            name: "root".into(),
            cert_pem: String::new(),
            key_pem: Some(String::new()),
            not_before: Utc::now(),
            not_after: Utc::now() + chrono::Duration::days(365),
            is_active: true,
            is_previous: false,
            can_sign: true,
            include_in_config: true,
            cert_version: nebula_core::CertVersion::V1,
            nebula_version: None,
            created_at: Utc::now(),
        };
        let id = ca.id;
        storage.ca.create(ca).await.unwrap();
        assert_eq!(storage.ca.get(id).await.unwrap().id, id);
    }
}
