//! Access-control repository ports: groups, firewall rulesets, permissions,
//! admin user groups, and per-node client permissions.

use async_trait::async_trait;
use nebula_core::{
    ClientPermission, ClientPermissionId, FirewallRule, FirewallRuleId, FirewallRuleset,
    FirewallRulesetId, Group, GroupId, NodeId, Permission, PermissionId, UserGroup, UserGroupId,
    UserId,
};
use nebula_error::Result;

/// Persistence for node groups.
#[async_trait]
pub trait GroupRepo: Send + Sync {
    async fn create(&self, group: Group) -> Result<()>;
    async fn get(&self, id: GroupId) -> Result<Group>;
    async fn list(&self) -> Result<Vec<Group>>;
    async fn delete(&self, id: GroupId) -> Result<()>;
}

/// Persistence for firewall rulesets and their rules.
#[async_trait]
pub trait FirewallRepo: Send + Sync {
    async fn create_ruleset(&self, ruleset: FirewallRuleset) -> Result<()>;
    async fn list_rulesets(&self) -> Result<Vec<FirewallRuleset>>;
    async fn get_ruleset(&self, id: FirewallRulesetId) -> Result<FirewallRuleset>;

    async fn add_rule(&self, rule: FirewallRule) -> Result<()>;
    async fn list_rules(&self, ruleset_id: FirewallRulesetId) -> Result<Vec<FirewallRule>>;
    async fn remove_rule(&self, id: FirewallRuleId) -> Result<()>;
}

/// Persistence for permission definitions.
#[async_trait]
pub trait PermissionRepo: Send + Sync {
    async fn create(&self, permission: Permission) -> Result<()>;
    async fn list(&self) -> Result<Vec<Permission>>;
    async fn get(&self, id: PermissionId) -> Result<Permission>;
}

/// Persistence for administrative user groups.
///
/// Admin membership is modeled solely through `UserGroup.is_admin` (see
/// `DESIGN.md`, Open Question 3) -- there is no separate role repository.
#[async_trait]
pub trait UserGroupRepo: Send + Sync {
    async fn create(&self, group: UserGroup) -> Result<()>;
    async fn get(&self, id: UserGroupId) -> Result<UserGroup>;
    async fn list(&self) -> Result<Vec<UserGroup>>;

    /// Groups a user belongs to, used for authorization checks.
    async fn groups_for_user(&self, user_id: UserId) -> Result<Vec<UserGroup>>;

    async fn add_user(&self, group_id: UserGroupId, user_id: UserId) -> Result<()>;
    async fn set_permissions(
        &self,
        group_id: UserGroupId,
        permission_ids: Vec<PermissionId>,
    ) -> Result<()>;

    /// Whether any admin group (and therefore any user) exists yet, used to
    /// decide whether first boot should run `bootstrap_defaults`.
    async fn any_admin_group_exists(&self) -> Result<bool>;
}

/// Persistence for per-`(user, node)` fine-grained permission grants, layered
/// on top of whatever a user's [`UserGroup`] memberships already grant.
#[async_trait]
pub trait ClientPermissionRepo: Send + Sync {
    async fn upsert(&self, grant: ClientPermission) -> Result<()>;
    async fn get(&self, user_id: UserId, node_id: NodeId) -> Result<Option<ClientPermission>>;
    async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<ClientPermission>>;
    async fn delete(&self, id: ClientPermissionId) -> Result<()>;
}
