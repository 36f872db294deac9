//! GitHub secret-scanning webhook audit trail port.

use async_trait::async_trait;
use nebula_core::WebhookAuditRow;
use nebula_error::Result;

/// Persistence for the secret-scanning webhook's audit rows.
#[async_trait]
pub trait WebhookAuditRepo: Send + Sync {
    /// Append one audit row. Never fails on an empty or unknown-token
    /// revoke attempt; the caller still records the attempt.
    async fn create(&self, row: WebhookAuditRow) -> Result<()>;

    /// All rows, newest first.
    async fn list(&self) -> Result<Vec<WebhookAuditRow>>;
}
