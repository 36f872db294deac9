//! [`TokenManager`]: issuing, reissuing, and validating client bearer tokens.

use std::sync::Arc;

use nebula_core::{system_setting_keys, NodeId, SystemSetting, Token, TokenId, UserId, DEFAULT_TOKEN_PREFIX};
use nebula_error::{NebulaError, Result};
use nebula_ports::{SettingsRepo, TokenRepo};

use crate::generate;

/// Issues and reissues bearer tokens, and resolves the fleet's current
/// token prefix from `SystemSetting(token_prefix)`.
pub struct TokenManager {
    tokens: Arc<dyn TokenRepo>,
    settings: Arc<dyn SettingsRepo>,
}

impl TokenManager {
    /// Construct a manager over the given repositories.
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenRepo>, settings: Arc<dyn SettingsRepo>) -> Self {
        Self { tokens, settings }
    }

    /// The fleet's configured token prefix, or [`DEFAULT_TOKEN_PREFIX`] if
    /// never set.
    pub async fn current_prefix(&self) -> Result<String> {
        let setting = self.settings.get_system(system_setting_keys::TOKEN_PREFIX).await?;
        Ok(setting.map_or_else(|| DEFAULT_TOKEN_PREFIX.to_string(), |s| s.value))
    }

    /// Change the fleet's token prefix. Does not affect tokens already
    /// issued under the previous prefix; they keep validating under the
    /// legacy fallback pattern.
    pub async fn set_prefix(&self, prefix: &str) -> Result<()> {
        if !generate::is_valid_prefix(prefix) {
            return Err(NebulaError::validation(
                "token_prefix must be 3-20 alphanumeric or underscore characters",
            ));
        }
        self.settings
            .put_system(SystemSetting {
                key: system_setting_keys::TOKEN_PREFIX.to_string(),
                value: prefix.to_string(),
                updated_at: chrono::Utc::now(),
                updated_by: None,
            })
            .await
    }

    /// Issue a new active token for a node. The returned `Token.value` is
    /// the only time the raw value is available; callers must surface it
    /// to the caller immediately.
    pub async fn issue(&self, node_id: NodeId, owner_user_id: Option<UserId>) -> Result<Token> {
        let prefix = self.current_prefix().await?;
        let token = Token {
            id: TokenId::new(),
            node_id,
            value: generate::generate(&prefix),
            is_active: true,
            owner_user_id,
            created_at: chrono::Utc::now(),
            revoked_at: None,
            revoked_by_partner: false,
        };
        self.tokens.create(token.clone()).await?;
        tracing::info!(node_id = %node_id, token_id = %token.id, preview = %generate::preview(&token.value), "issued token");
        Ok(token)
    }

    /// Revoke an existing token and issue a fresh one for the same node,
    /// preserving its owner. The revoked token's row is retained for audit.
    pub async fn reissue(&self, token_id: TokenId) -> Result<Token> {
        let old = self.tokens.get(token_id).await?;
        self.tokens.revoke(token_id, false).await?;
        tracing::info!(token_id = %token_id, node_id = %old.node_id, "revoked token for reissue");
        self.issue(old.node_id, old.owner_user_id).await
    }

    /// Whether `value` is well-formed under the current prefix or the
    /// legacy unprefixed pattern. Does not check the repository.
    pub async fn validate_format(&self, value: &str) -> Result<bool> {
        let prefix = self.current_prefix().await?;
        Ok(generate::is_valid_format(value, &prefix))
    }

    /// Look up the active token matching a literal bearer value.
    pub async fn resolve(&self, value: &str) -> Result<Option<Token>> {
        self.tokens.get_by_value(value).await
    }
}
