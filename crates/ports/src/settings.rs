//! Fleet-wide settings and enrollment-code repository ports.

use async_trait::async_trait;
use nebula_core::{EnrollmentCode, EnrollmentCodeId, GlobalSettings, NodeId, SystemSetting};
use nebula_error::Result;

/// Persistence for fleet-wide settings.
#[async_trait]
pub trait SettingsRepo: Send + Sync {
    /// Fetch the singleton settings row, creating defaults on first access.
    async fn get_global(&self) -> Result<GlobalSettings>;

    /// Persist an update to the singleton settings row.
    async fn put_global(&self, settings: GlobalSettings) -> Result<()>;

    /// Fetch one opaque key/value setting.
    async fn get_system(&self, key: &str) -> Result<Option<SystemSetting>>;

    /// Upsert one opaque key/value setting.
    async fn put_system(&self, setting: SystemSetting) -> Result<()>;
}

/// Persistence for single-use enrollment codes.
#[async_trait]
pub trait EnrollmentRepo: Send + Sync {
    async fn create(&self, code: EnrollmentCode) -> Result<()>;
    async fn get_by_code(&self, code: &str) -> Result<Option<EnrollmentCode>>;
    async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<EnrollmentCode>>;
    async fn mark_used(&self, id: EnrollmentCodeId) -> Result<()>;
}
