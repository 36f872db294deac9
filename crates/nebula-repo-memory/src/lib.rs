#![warn(missing_docs)]

//! # Nebula In-Memory Repository
//!
//! `DashMap`-backed implementation of every port trait in `nebula-ports`.
//! This is the default backend (a SQL-backed driver is out of scope for this
//! workspace): a single process, restarted, loses its fleet state, which is
//! fine for the reference deployment and for tests.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use nebula_core::*;
use nebula_error::{NebulaError, Result};
use nebula_ports::{
    CaRepo, ClientPermissionRepo, EnrollmentRepo, FirewallRepo, GroupRepo, HostCertRepo, IpamRepo,
    NodeRepo, PermissionRepo, SettingsRepo, TokenRepo, UserGroupRepo, WebhookAuditRepo,
};
use tokio::sync::RwLock;

/// In-memory backing store for every repository port.
///
/// Cloning a `MemoryStore` is cheap and shares state (every field is an
/// `Arc`-wrapped concurrent map), matching how `nebula-storage` hands the
/// same store to every HTTP handler.
#[derive(Default, Clone)]
pub struct MemoryStore {
    cas: Arc<DashMap<CaId, Ca>>,
    nodes: Arc<DashMap<NodeId, Node>>,
    tokens: Arc<DashMap<TokenId, Token>>,
    host_certs: Arc<DashMap<HostCertId, HostCert>>,
    ip_pools: Arc<DashMap<IpPoolId, IpPool>>,
    ip_groups: Arc<DashMap<IpGroupId, IpGroup>>,
    ip_assignments: Arc<DashMap<IpAssignmentId, IpAssignment>>,
    groups: Arc<DashMap<GroupId, Group>>,
    firewall_rulesets: Arc<DashMap<FirewallRulesetId, FirewallRuleset>>,
    firewall_rules: Arc<DashMap<FirewallRuleId, FirewallRule>>,
    permissions: Arc<DashMap<PermissionId, Permission>>,
    user_groups: Arc<DashMap<UserGroupId, UserGroup>>,
    client_permissions: Arc<DashMap<ClientPermissionId, ClientPermission>>,
    global_settings: Arc<RwLock<Option<GlobalSettings>>>,
    system_settings: Arc<DashMap<String, SystemSetting>>,
    enrollment_codes: Arc<DashMap<EnrollmentCodeId, EnrollmentCode>>,
    webhook_audit_rows: Arc<DashMap<WebhookAuditRowId, WebhookAuditRow>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaRepo for MemoryStore {
    async fn create(&self, ca: Ca) -> Result<()> {
        self.cas.insert(ca.id, ca);
        Ok(())
    }

    async fn get(&self, id: CaId) -> Result<Ca> {
        self.cas.get(&id).map(|r| r.clone()).ok_or_else(|| NebulaError::not_found("Ca", id))
    }

    async fn active_signing(&self, cert_version: CertVersion) -> Result<Option<Ca>> {
        Ok(self
            .cas
            .iter()
            .filter(|r| r.is_signing() && r.cert_version == cert_version)
            .max_by_key(|r| r.not_after)
            .map(|r| r.clone()))
    }

    async fn included_in_config(&self) -> Result<Vec<Ca>> {
        let now = Utc::now();
        Ok(self
            .cas
            .iter()
            .filter(|r| r.include_in_config && r.not_after > now)
            .map(|r| r.clone())
            .collect())
    }

    async fn list(&self) -> Result<Vec<Ca>> {
        let mut all: Vec<_> = self.cas.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn demote(&self, id: CaId) -> Result<()> {
        let mut ca = CaRepo::get(self, id).await?;
        ca.is_previous = true;
        ca.include_in_config = true;
        self.cas.insert(id, ca);
        Ok(())
    }

    async fn deactivate(&self, id: CaId) -> Result<()> {
        let mut ca = CaRepo::get(self, id).await?;
        ca.is_active = false;
        self.cas.insert(id, ca);
        Ok(())
    }

    async fn delete(&self, id: CaId) -> Result<()> {
        let ca = CaRepo::get(self, id).await?;
        if ca.is_signing() {
            return Err(NebulaError::conflict("cannot delete an active signing CA"));
        }
        self.cas.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl NodeRepo for MemoryStore {
    async fn create(&self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(NebulaError::conflict(format!("node {} already exists", node.id)));
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    async fn get(&self, id: NodeId) -> Result<Node> {
        self.nodes.get(&id).map(|r| r.clone()).ok_or_else(|| NebulaError::not_found("Node", id))
    }

    async fn list(&self, owner_user_id: Option<UserId>) -> Result<Vec<Node>> {
        Ok(self
            .nodes
            .iter()
            .filter(|r| owner_user_id.is_none_or(|owner| r.owner_user_id == Some(owner)))
            .map(|r| r.clone())
            .collect())
    }

    async fn set_blocked(&self, id: NodeId, blocked: bool) -> Result<()> {
        let mut node = NodeRepo::get(self, id).await?;
        node.is_blocked = blocked;
        self.nodes.insert(id, node);
        Ok(())
    }

    async fn set_groups(&self, id: NodeId, group_ids: Vec<GroupId>) -> Result<()> {
        let mut node = NodeRepo::get(self, id).await?;
        node.group_ids = group_ids;
        node.config_last_changed_at = Utc::now();
        self.nodes.insert(id, node);
        Ok(())
    }

    async fn set_rulesets(&self, id: NodeId, ruleset_ids: Vec<FirewallRulesetId>) -> Result<()> {
        let mut node = NodeRepo::get(self, id).await?;
        node.ruleset_ids = ruleset_ids;
        node.config_last_changed_at = Utc::now();
        self.nodes.insert(id, node);
        Ok(())
    }

    async fn record_checkin(
        &self,
        id: NodeId,
        client_version: Option<String>,
        nebula_version: Option<semver::Version>,
        os_type: OsType,
    ) -> Result<()> {
        let mut node = NodeRepo::get(self, id).await?;
        let now = Utc::now();
        node.last_config_download_at = Some(now);
        node.last_version_report_at = Some(now);
        node.os_type = os_type;
        if client_version.is_some() {
            node.client_version = client_version;
        }
        if nebula_version.is_some() {
            node.nebula_version = nebula_version;
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    async fn delete(&self, id: NodeId) -> Result<()> {
        self.nodes.remove(&id).ok_or_else(|| NebulaError::not_found("Node", id))?;
        self.tokens.retain(|_, t| t.node_id != id);
        self.host_certs.retain(|_, c| c.node_id != id);
        self.ip_assignments.retain(|_, a| a.node_id != id);
        Ok(())
    }
}

#[async_trait]
impl TokenRepo for MemoryStore {
    async fn create(&self, token: Token) -> Result<()> {
        self.tokens.insert(token.id, token);
        Ok(())
    }

    async fn get(&self, id: TokenId) -> Result<Token> {
        self.tokens.get(&id).map(|r| r.clone()).ok_or_else(|| NebulaError::not_found("Token", id))
    }

    async fn get_by_value(&self, value: &str) -> Result<Option<Token>> {
        Ok(self.tokens.iter().find(|r| r.value == value && r.is_active).map(|r| r.clone()))
    }

    async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<Token>> {
        let mut tokens: Vec<_> =
            self.tokens.iter().filter(|r| r.node_id == node_id).map(|r| r.clone()).collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    async fn revoke(&self, id: TokenId, by_partner: bool) -> Result<()> {
        let mut token = TokenRepo::get(self, id).await?;
        token.is_active = false;
        token.revoked_at = Some(Utc::now());
        token.revoked_by_partner = by_partner;
        self.tokens.insert(id, token);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Token>> {
        Ok(self.tokens.iter().map(|r| r.clone()).collect())
    }
}

#[async_trait]
impl HostCertRepo for MemoryStore {
    async fn create(&self, cert: HostCert) -> Result<()> {
        self.host_certs.insert(cert.id, cert);
        Ok(())
    }

    async fn get(&self, id: HostCertId) -> Result<HostCert> {
        self.host_certs
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| NebulaError::not_found("HostCert", id))
    }

    async fn latest_non_revoked_for_node(&self, node_id: NodeId) -> Result<Option<HostCert>> {
        Ok(self
            .host_certs
            .iter()
            .filter(|r| r.node_id == node_id && !r.revoked)
            .max_by_key(|r| r.created_at)
            .map(|r| r.clone()))
    }

    async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<HostCert>> {
        let mut certs: Vec<_> =
            self.host_certs.iter().filter(|r| r.node_id == node_id).map(|r| r.clone()).collect();
        certs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(certs)
    }

    async fn revoke(&self, id: HostCertId) -> Result<()> {
        let mut cert = HostCertRepo::get(self, id).await?;
        cert.revoked = true;
        cert.revoked_at = Some(Utc::now());
        self.host_certs.insert(id, cert);
        Ok(())
    }

    async fn active_revoked_fingerprints(&self) -> Result<Vec<String>> {
        let now = Utc::now();
        Ok(self
            .host_certs
            .iter()
            .filter(|r| r.revoked && r.not_after > now)
            .filter_map(|r| r.fingerprint.clone())
            .collect())
    }
}

#[async_trait]
impl IpamRepo for MemoryStore {
    async fn create_pool(&self, pool: IpPool) -> Result<()> {
        self.ip_pools.insert(pool.id, pool);
        Ok(())
    }

    async fn get_pool(&self, id: IpPoolId) -> Result<IpPool> {
        self.ip_pools.get(&id).map(|r| r.clone()).ok_or_else(|| NebulaError::not_found("IpPool", id))
    }

    async fn list_pools(&self) -> Result<Vec<IpPool>> {
        Ok(self.ip_pools.iter().map(|r| r.clone()).collect())
    }

    async fn create_group(&self, group: IpGroup) -> Result<()> {
        self.ip_groups.insert(group.id, group);
        Ok(())
    }

    async fn list_groups(&self, pool_id: IpPoolId) -> Result<Vec<IpGroup>> {
        Ok(self.ip_groups.iter().filter(|r| r.pool_id == pool_id).map(|r| r.clone()).collect())
    }

    async fn get_group(&self, id: IpGroupId) -> Result<IpGroup> {
        self.ip_groups
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| NebulaError::not_found("IpGroup", id))
    }

    async fn list_assignments(&self, pool_id: IpPoolId) -> Result<Vec<IpAssignment>> {
        Ok(self.ip_assignments.iter().filter(|r| r.pool_id == pool_id).map(|r| r.clone()).collect())
    }

    async fn list_assignments_for_node(&self, node_id: NodeId) -> Result<Vec<IpAssignment>> {
        Ok(self.ip_assignments.iter().filter(|r| r.node_id == node_id).map(|r| r.clone()).collect())
    }

    async fn create_assignment(&self, assignment: IpAssignment) -> Result<()> {
        if self.is_assigned(assignment.pool_id, assignment.address).await? {
            return Err(NebulaError::conflict(format!(
                "address {} already assigned in pool {}",
                assignment.address, assignment.pool_id
            )));
        }
        self.ip_assignments.insert(assignment.id, assignment);
        Ok(())
    }

    async fn delete_assignment(&self, id: IpAssignmentId) -> Result<()> {
        self.ip_assignments.remove(&id).ok_or_else(|| NebulaError::not_found("IpAssignment", id))?;
        Ok(())
    }

    async fn is_assigned(&self, pool_id: IpPoolId, address: Ipv4Addr) -> Result<bool> {
        Ok(self.ip_assignments.iter().any(|r| r.pool_id == pool_id && r.address == address))
    }
}

#[async_trait]
impl GroupRepo for MemoryStore {
    async fn create(&self, group: Group) -> Result<()> {
        self.groups.insert(group.id, group);
        Ok(())
    }

    async fn get(&self, id: GroupId) -> Result<Group> {
        self.groups.get(&id).map(|r| r.clone()).ok_or_else(|| NebulaError::not_found("Group", id))
    }

    async fn list(&self) -> Result<Vec<Group>> {
        Ok(self.groups.iter().map(|r| r.clone()).collect())
    }

    async fn delete(&self, id: GroupId) -> Result<()> {
        self.groups.remove(&id).ok_or_else(|| NebulaError::not_found("Group", id))?;
        Ok(())
    }
}

#[async_trait]
impl FirewallRepo for MemoryStore {
    async fn create_ruleset(&self, ruleset: FirewallRuleset) -> Result<()> {
        self.firewall_rulesets.insert(ruleset.id, ruleset);
        Ok(())
    }

    async fn list_rulesets(&self) -> Result<Vec<FirewallRuleset>> {
        Ok(self.firewall_rulesets.iter().map(|r| r.clone()).collect())
    }

    async fn get_ruleset(&self, id: FirewallRulesetId) -> Result<FirewallRuleset> {
        self.firewall_rulesets
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| NebulaError::not_found("FirewallRuleset", id))
    }

    async fn add_rule(&self, rule: FirewallRule) -> Result<()> {
        self.firewall_rules.insert(rule.id, rule);
        Ok(())
    }

    async fn list_rules(&self, ruleset_id: FirewallRulesetId) -> Result<Vec<FirewallRule>> {
        Ok(self
            .firewall_rules
            .iter()
            .filter(|r| r.ruleset_id == ruleset_id)
            .map(|r| r.clone())
            .collect())
    }

    async fn remove_rule(&self, id: FirewallRuleId) -> Result<()> {
        self.firewall_rules.remove(&id).ok_or_else(|| NebulaError::not_found("FirewallRule", id))?;
        Ok(())
    }
}

#[async_trait]
impl PermissionRepo for MemoryStore {
    async fn create(&self, permission: Permission) -> Result<()> {
        self.permissions.insert(permission.id, permission);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Permission>> {
        Ok(self.permissions.iter().map(|r| r.clone()).collect())
    }

    async fn get(&self, id: PermissionId) -> Result<Permission> {
        self.permissions
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| NebulaError::not_found("Permission", id))
    }
}

#[async_trait]
impl UserGroupRepo for MemoryStore {
    async fn create(&self, group: UserGroup) -> Result<()> {
        self.user_groups.insert(group.id, group);
        Ok(())
    }

    async fn get(&self, id: UserGroupId) -> Result<UserGroup> {
        self.user_groups
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| NebulaError::not_found("UserGroup", id))
    }

    async fn list(&self) -> Result<Vec<UserGroup>> {
        Ok(self.user_groups.iter().map(|r| r.clone()).collect())
    }

    async fn groups_for_user(&self, user_id: UserId) -> Result<Vec<UserGroup>> {
        Ok(self
            .user_groups
            .iter()
            .filter(|r| r.user_ids.contains(&user_id))
            .map(|r| r.clone())
            .collect())
    }

    async fn add_user(&self, group_id: UserGroupId, user_id: UserId) -> Result<()> {
        let mut group = UserGroupRepo::get(self, group_id).await?;
        if !group.user_ids.contains(&user_id) {
            group.user_ids.push(user_id);
        }
        self.user_groups.insert(group_id, group);
        Ok(())
    }

    async fn set_permissions(
        &self,
        group_id: UserGroupId,
        permission_ids: Vec<PermissionId>,
    ) -> Result<()> {
        let mut group = UserGroupRepo::get(self, group_id).await?;
        group.permission_ids = permission_ids;
        self.user_groups.insert(group_id, group);
        Ok(())
    }

    async fn any_admin_group_exists(&self) -> Result<bool> {
        Ok(self.user_groups.iter().any(|r| r.is_admin))
    }
}

#[async_trait]
impl ClientPermissionRepo for MemoryStore {
    async fn upsert(&self, grant: ClientPermission) -> Result<()> {
        self.client_permissions.insert(grant.id, grant);
        Ok(())
    }

    async fn get(&self, user_id: UserId, node_id: NodeId) -> Result<Option<ClientPermission>> {
        Ok(self
            .client_permissions
            .iter()
            .find(|r| r.user_id == user_id && r.node_id == node_id)
            .map(|r| *r))
    }

    async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<ClientPermission>> {
        Ok(self.client_permissions.iter().filter(|r| r.node_id == node_id).map(|r| *r).collect())
    }

    async fn delete(&self, id: ClientPermissionId) -> Result<()> {
        self.client_permissions
            .remove(&id)
            .ok_or_else(|| NebulaError::not_found("ClientPermission", id))?;
        Ok(())
    }
}

#[async_trait]
impl SettingsRepo for MemoryStore {
    async fn get_global(&self) -> Result<GlobalSettings> {
        let guard = self.global_settings.read().await;
        match &*guard {
            Some(settings) => Ok(settings.clone()),
            None => Ok(GlobalSettings {
                lighthouse_port: 4242,
                lighthouse_public_addrs: Vec::new(),
                punchy_enabled: false,
                default_cidr_pool: None,
                cert_version: CertVersion::V1,
                nebula_version: None,
                client_docker_image: String::new(),
                server_url: String::new(),
                docker_compose_template: String::new(),
            }),
        }
    }

    async fn put_global(&self, settings: GlobalSettings) -> Result<()> {
        *self.global_settings.write().await = Some(settings);
        Ok(())
    }

    async fn get_system(&self, key: &str) -> Result<Option<SystemSetting>> {
        Ok(self.system_settings.get(key).map(|r| r.clone()))
    }

    async fn put_system(&self, setting: SystemSetting) -> Result<()> {
        self.system_settings.insert(setting.key.clone(), setting);
        Ok(())
    }
}

#[async_trait]
impl EnrollmentRepo for MemoryStore {
    async fn create(&self, code: EnrollmentCode) -> Result<()> {
        self.enrollment_codes.insert(code.id, code);
        Ok(())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<EnrollmentCode>> {
        Ok(self.enrollment_codes.iter().find(|r| r.code == code).map(|r| r.clone()))
    }

    async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<EnrollmentCode>> {
        Ok(self
            .enrollment_codes
            .iter()
            .filter(|r| r.node_id == node_id)
            .map(|r| r.clone())
            .collect())
    }

    async fn mark_used(&self, id: EnrollmentCodeId) -> Result<()> {
        let mut code = self
            .enrollment_codes
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| NebulaError::not_found("EnrollmentCode", id))?;
        code.used_at = Some(Utc::now());
        self.enrollment_codes.insert(id, code);
        Ok(())
    }
}

#[async_trait]
impl WebhookAuditRepo for MemoryStore {
    async fn create(&self, row: WebhookAuditRow) -> Result<()> {
        self.webhook_audit_rows.insert(row.id, row);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WebhookAuditRow>> {
        let mut all: Vec<_> = self.webhook_audit_rows.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
