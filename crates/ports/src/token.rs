//! Token repository port.

use async_trait::async_trait;
use nebula_core::{NodeId, Token, TokenId};
use nebula_error::Result;

/// Persistence for client bearer tokens.
#[async_trait]
pub trait TokenRepo: Send + Sync {
    /// Persist a newly issued token.
    async fn create(&self, token: Token) -> Result<()>;

    /// Fetch a token by ID.
    async fn get(&self, id: TokenId) -> Result<Token>;

    /// Fetch the (at most one) active token matching a literal value.
    async fn get_by_value(&self, value: &str) -> Result<Option<Token>>;

    /// All tokens issued for a node, newest first.
    async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<Token>>;

    /// Revoke a token. `by_partner` records whether revocation was triggered
    /// by the GitHub secret-scanning webhook rather than an administrator.
    async fn revoke(&self, id: TokenId, by_partner: bool) -> Result<()>;

    /// All tokens, used by the secret-scanning verify/revoke handlers to
    /// search by value.
    async fn list(&self) -> Result<Vec<Token>>;
}
