//! Node repository port.

use async_trait::async_trait;
use nebula_core::{FirewallRulesetId, GroupId, Node, NodeId, OsType, UserId};
use nebula_error::Result;

/// Persistence for enrolled nodes.
#[async_trait]
pub trait NodeRepo: Send + Sync {
    /// Persist a newly enrolled node.
    async fn create(&self, node: Node) -> Result<()>;

    /// Fetch a node by ID.
    async fn get(&self, id: NodeId) -> Result<Node>;

    /// All nodes, optionally filtered to nodes owned by `owner_user_id`.
    async fn list(&self, owner_user_id: Option<UserId>) -> Result<Vec<Node>>;

    /// Update administrative block state.
    async fn set_blocked(&self, id: NodeId, blocked: bool) -> Result<()>;

    /// Replace a node's group memberships; bumps `config_last_changed_at`.
    async fn set_groups(&self, id: NodeId, group_ids: Vec<GroupId>) -> Result<()>;

    /// Replace a node's attached firewall rulesets; bumps
    /// `config_last_changed_at`.
    async fn set_rulesets(&self, id: NodeId, ruleset_ids: Vec<FirewallRulesetId>) -> Result<()>;

    /// Record the version/platform reported by the node's most recent
    /// `/v1/client/config` fetch.
    async fn record_checkin(
        &self,
        id: NodeId,
        client_version: Option<String>,
        nebula_version: Option<semver::Version>,
        os_type: OsType,
    ) -> Result<()>;

    /// Remove a node entirely; cascades its tokens, certs, and IP
    /// assignments.
    async fn delete(&self, id: NodeId) -> Result<()>;
}
