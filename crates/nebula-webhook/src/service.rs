//! [`WebhookService`]: the GitHub secret-scanning partner's three touch
//! points, independent of the HTTP framing in [`crate::router`].

use std::sync::Arc;

use nebula_core::{system_setting_keys, Token, WebhookAuditRow, WebhookAuditRowId};
use nebula_error::{NebulaError, Result};
use nebula_ports::{NodeRepo, SettingsRepo, TokenRepo, WebhookAuditRepo};

use crate::model::{PatternEntry, RevokeResponse, TokenMatch, VerifyResult};
use crate::signature;

const PATTERN_TYPE: &str = "managed_nebula_client_token";

/// Coordinates token lookup, HMAC verification, and audit logging for the
/// secret-scanning partner endpoints.
pub struct WebhookService {
    tokens: Arc<dyn TokenRepo>,
    nodes: Arc<dyn NodeRepo>,
    settings: Arc<dyn SettingsRepo>,
    audit: Arc<dyn WebhookAuditRepo>,
}

impl WebhookService {
    /// Construct a service over the given repositories.
    #[must_use]
    pub fn new(
        tokens: Arc<dyn TokenRepo>,
        nodes: Arc<dyn NodeRepo>,
        settings: Arc<dyn SettingsRepo>,
        audit: Arc<dyn WebhookAuditRepo>,
    ) -> Self {
        Self { tokens, nodes, settings, audit }
    }

    /// The public, unauthenticated pattern-set document.
    pub async fn pattern_entries(&self) -> Result<Vec<PatternEntry>> {
        let setting = self.settings.get_system(system_setting_keys::TOKEN_PREFIX).await?;
        let prefix = setting.map_or_else(|| nebula_core::DEFAULT_TOKEN_PREFIX.to_string(), |s| s.value);
        Ok(vec![PatternEntry { kind: PATTERN_TYPE.to_string(), pattern: format!("{prefix}[a-z0-9]{{32}}") }])
    }

    /// Verify the HMAC signature of a raw request body against
    /// `SystemSetting(github_webhook_secret)`.
    ///
    /// # Errors
    /// [`nebula_error::ErrorKind::NotFound`] if the secret is unset,
    /// [`nebula_error::ErrorKind::Unauthenticated`] if it is set but the
    /// signature doesn't match.
    pub async fn verify_signature(&self, body: &[u8], signature_header: Option<&str>) -> Result<()> {
        let setting = self.settings.get_system(system_setting_keys::GITHUB_WEBHOOK_SECRET).await?;
        let secret = setting.ok_or_else(|| {
            NebulaError::not_found("SystemSetting", system_setting_keys::GITHUB_WEBHOOK_SECRET)
        })?;
        let header = signature_header
            .ok_or_else(|| NebulaError::unauthenticated("missing webhook signature header"))?;
        if signature::verify(&secret.value, body, header) {
            Ok(())
        } else {
            Err(NebulaError::unauthenticated("webhook signature does not match"))
        }
    }

    /// Resolve each submitted token match to a [`VerifyResult`] row.
    /// Unknown tokens are silently dropped rather than returning an error,
    /// so the response never leaks which rows were present vs. absent.
    pub async fn verify(&self, matches: &[TokenMatch]) -> Result<Vec<VerifyResult>> {
        let server_url = self.settings.get_global().await?.server_url;
        let mut results = Vec::new();
        for candidate in matches {
            let Some(token) = self.tokens.get_by_value(&candidate.token).await? else { continue };
            let node = self.nodes.get(token.node_id).await?;
            results.push(VerifyResult {
                token: token.value.clone(),
                kind: candidate.kind.clone(),
                label: node.name,
                url: format!("{server_url}/nodes/{}", token.node_id),
                is_active: token.is_active,
            });
        }
        Ok(results)
    }

    /// Deactivate every matching active token and append one audit row per
    /// match (including unknown-token attempts, whose row records
    /// `is_active = false` with no `node_id`).
    pub async fn revoke(&self, matches: &[TokenMatch]) -> Result<RevokeResponse> {
        let mut revoked_count = 0;
        for candidate in matches {
            let found: Option<Token> = self.tokens.get_by_value(&candidate.token).await?;
            let is_active_after = match &found {
                Some(token) if token.is_active => {
                    self.tokens.revoke(token.id, true).await?;
                    revoked_count += 1;
                    false
                }
                Some(_) => false,
                None => false,
            };
            self.audit
                .create(WebhookAuditRow {
                    id: WebhookAuditRowId::new(),
                    action: "revoke".to_string(),
                    token_preview: nebula_token::preview(&candidate.token),
                    github_url: candidate.url.clone(),
                    is_active: is_active_after,
                    node_id: found.map(|t| t.node_id),
                    created_at: chrono::Utc::now(),
                })
                .await?;
        }
        Ok(RevokeResponse { revoked_count })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nebula_core::{IpVersion, Node, NodeId, OsType};
    use nebula_repo_memory::MemoryStore;
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_node() -> Node {
        let now = chrono::Utc::now();
        Node {
            id: NodeId::new(),
            name: "n1".to_string(),
            is_lighthouse: false,
            public_ip: None,
            is_blocked: false,
            owner_user_id: None,
            ip_version: IpVersion::Ipv4Only,
            os_type: OsType::Docker,
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

    async fn service() -> (WebhookService, Arc<MemoryStore>, Node, Token) {
        let store = Arc::new(MemoryStore::new());
        let node = sample_node();
        NodeRepo::create(&*store, node.clone()).await.unwrap();
        let mut global = store.get_global().await.unwrap();
        global.server_url = "https://fleet.example".to_string();
        store.put_global(global).await.unwrap();

        let token = Token {
            id: nebula_core::TokenId::new(),
            node_id: node.id,
            value: "mnebula_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            is_active: true,
            owner_user_id: None,
            created_at: chrono::Utc::now(),
            revoked_at: None,
            revoked_by_partner: false,
        };
        TokenRepo::create(&*store, token.clone()).await.unwrap();

        let svc = WebhookService::new(store.clone(), store.clone(), store.clone(), store.clone());
        (svc, store, node, token)
    }

    #[tokio::test]
    async fn pattern_entries_uses_default_prefix_when_unset() {
        let (svc, ..) = service().await;
        let entries = svc.pattern_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pattern, "mnebula_[a-z0-9]{32}");
    }

    #[tokio::test]
    async fn verify_signature_fails_when_secret_unset() {
        let (svc, ..) = service().await;
        let err = svc.verify_signature(b"body", Some("sha256=deadbeef")).await.unwrap_err();
        assert_eq!(err.kind(), nebula_error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn verify_signature_rejects_a_bad_signature_once_secret_is_set() {
        let (svc, store, ..) = service().await;
        store
            .put_system(nebula_core::SystemSetting {
                key: system_setting_keys::GITHUB_WEBHOOK_SECRET.to_string(),
                value: "s3cr3t".to_string(),
                updated_at: chrono::Utc::now(),
                updated_by: None,
            })
            .await
            .unwrap();
        let err = svc.verify_signature(b"body", Some("sha256=deadbeef")).await.unwrap_err();
        assert_eq!(err.kind(), nebula_error::ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn verify_resolves_known_token_and_drops_unknown_ones() {
        let (svc, _store, node, token) = service().await;
        let matches = vec![
            TokenMatch { token: token.value.clone(), url: "https://github.com/x".to_string(), kind: "t".to_string() },
            TokenMatch { token: "unknown".to_string(), url: "https://github.com/y".to_string(), kind: "t".to_string() },
        ];
        let results = svc.verify(&matches).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, node.name);
        assert!(results[0].url.contains(&node.id.to_string()));
        assert!(results[0].is_active);
    }

    #[tokio::test]
    async fn revoke_deactivates_a_known_active_token_and_counts_it() {
        let (svc, store, _node, token) = service().await;
        let matches = vec![TokenMatch {
            token: token.value.clone(),
            url: "https://github.com/x".to_string(),
            kind: "t".to_string(),
        }];
        let response = svc.revoke(&matches).await.unwrap();
        assert_eq!(response.revoked_count, 1);
        let reloaded = TokenRepo::get(&*store, token.id).await.unwrap();
        assert!(!reloaded.is_active);
        assert!(reloaded.revoked_by_partner);
    }

    #[tokio::test]
    async fn revoke_of_an_unknown_token_still_writes_an_audit_row_and_counts_zero() {
        let (svc, store, ..) = service().await;
        let matches = vec![TokenMatch {
            token: "unknown".to_string(),
            url: "https://github.com/z".to_string(),
            kind: "t".to_string(),
        }];
        let response = svc.revoke(&matches).await.unwrap();
        assert_eq!(response.revoked_count, 0);
        assert_eq!(WebhookAuditRepo::list(&*store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revoking_the_same_token_twice_counts_zero_the_second_time() {
        let (svc, _store, _node, token) = service().await;
        let matches = vec![TokenMatch {
            token: token.value.clone(),
            url: "https://github.com/x".to_string(),
            kind: "t".to_string(),
        }];
        assert_eq!(svc.revoke(&matches).await.unwrap().revoked_count, 1);
        assert_eq!(svc.revoke(&matches).await.unwrap().revoked_count, 0);
    }
}
