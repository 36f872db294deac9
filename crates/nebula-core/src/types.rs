//! Entity types making up the fleet control plane's data model.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::id::{
    CaId, ClientPermissionId, EnrollmentCodeId, FirewallRuleId, FirewallRulesetId, GroupId,
    HostCertId, IpAssignmentId, IpGroupId, IpPoolId, NodeId, PermissionId, TokenId, UserGroupId,
    UserId,
};

/// Which Nebula certificate format(s) a `ConfigBuilder` should emit for a
/// node, negotiated from the client's reported Nebula version. A single
/// [`Ca`] is always `V1` or `V2`; `Hybrid` only appears on [`HostCert`] and
/// [`GlobalSettings`], where it means "both, concatenated".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertVersion {
    /// Pre-1.9 Nebula: v1 certificates only.
    V1,
    /// Nebula 1.9+: v2 certificates only.
    V2,
    /// Mixed fleet during a rolling upgrade: both v1 and v2 concatenated.
    Hybrid,
}

/// How many overlay addresses a node needs and which Nebula cert format that
/// implies (`ConfigBuilder::negotiate_cert_version`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpVersion {
    Ipv4Only,
    Ipv6Only,
    DualStack,
    MultiIpv4,
    MultiIpv6,
    MultiBoth,
}

impl IpVersion {
    /// Whether this topology can only be expressed in a v2 (multi-IP)
    /// certificate.
    #[must_use]
    pub fn requires_v2(self) -> bool {
        matches!(self, Self::Ipv6Only | Self::DualStack | Self::MultiIpv4 | Self::MultiIpv6 | Self::MultiBoth)
    }
}

/// Node agent host platform, used to pick filesystem paths for the emitted
/// config bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsType {
    Docker,
    Windows,
    Macos,
}

/// A certificate authority, including its own rotation/overlap state.
///
/// At most one `Ca` per `cert_version` has `is_active && can_sign` at a
/// time -- that is the CA `CertManager::issue_or_rotate` signs new host
/// certs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ca {
    pub id: CaId,
    pub name: String,
    pub cert_pem: String,
    /// Absent for a public-only import (`can_sign = false`).
    pub key_pem: Option<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Cleared by the scheduler once `ca_overlap_days` have passed since a
    /// `is_previous` CA's `created_at`.
    pub is_active: bool,
    /// Set when a successor CA of the same `cert_version` has been created;
    /// stays `include_in_config` for the overlap window so in-flight peers
    /// still verify against it.
    pub is_previous: bool,
    /// `false` for CAs imported without a private key.
    pub can_sign: bool,
    /// Whether this CA's cert PEM is still distributed to nodes.
    pub include_in_config: bool,
    pub cert_version: CertVersion,
    pub nebula_version: Option<semver::Version>,
    pub created_at: DateTime<Utc>,
}

impl Ca {
    /// Whether `now` falls inside this CA's validity window.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before && now <= self.not_after
    }

    /// Whether this CA is eligible to sign new host certs right now.
    #[must_use]
    pub fn is_signing(&self) -> bool {
        self.is_active && self.can_sign
    }
}

/// A fleet member: one physical or virtual machine running the Nebula
/// client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub is_lighthouse: bool,
    pub public_ip: Option<Ipv4Addr>,
    /// Administratively denies config fetches and cert issuance.
    pub is_blocked: bool,
    pub owner_user_id: Option<UserId>,
    pub ip_version: IpVersion,
    pub os_type: OsType,
    /// Memberships used by firewall-rule `group`/`groups` matching.
    pub group_ids: Vec<GroupId>,
    /// Firewall rulesets attached to this node.
    pub ruleset_ids: Vec<FirewallRulesetId>,
    pub client_version: Option<String>,
    pub nebula_version: Option<semver::Version>,
    /// Bumped whenever a config-affecting mutation occurs; part of the
    /// issuance fingerprint's implicit staleness check.
    pub config_last_changed_at: DateTime<Utc>,
    pub last_config_download_at: Option<DateTime<Utc>>,
    pub last_version_report_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An opaque bearer credential a node presents when fetching its config.
///
/// `value` is the literal `<prefix><32 lowercase alphanumerics>` string;
/// API responses redact it to a 12-character preview everywhere except the
/// single reissue response that reveals it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub node_id: NodeId,
    pub value: String,
    pub is_active: bool,
    pub owner_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    /// Set when revocation was triggered by the GitHub secret-scanning
    /// partner webhook rather than an administrator.
    pub revoked_by_partner: bool,
}

/// A signed Nebula host certificate issued for one node.
///
/// `issued_for_ip_cidr`/`issued_for_groups_hash`/`cert_version`/
/// `issued_by_ca_id` together form the issuance fingerprint
/// `CertManager::issue_or_rotate` uses to decide reuse vs. re-sign.
/// `fingerprint` is the unrelated content hash used for the revocation
/// blocklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCert {
    pub id: HostCertId,
    pub node_id: NodeId,
    pub cert_pem: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// `nebula-cert print -json` fingerprint; best-effort, `None` tolerated.
    pub fingerprint: Option<String>,
    pub issued_for_ip_cidr: String,
    pub issued_for_groups_hash: String,
    pub issued_by_ca_id: CaId,
    pub cert_version: CertVersion,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl HostCert {
    /// Whether this cert is still within `reuse_threshold` of expiry (the
    /// `notAfter - now >= 7 days` reuse precondition).
    #[must_use]
    pub fn has_headroom(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.not_after - now >= threshold
    }
}

/// A CIDR block carved into per-node addresses, optionally subdivided into
/// [`IpGroup`] sub-ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpPool {
    pub id: IpPoolId,
    pub cidr: Ipv4Net,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A sub-range of an [`IpPool`], used to reserve addresses for a subset of
/// nodes (e.g. a site or a role) within the pool's CIDR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpGroup {
    pub id: IpGroupId,
    pub pool_id: IpPoolId,
    pub name: String,
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

/// One allocated address, either the node's primary overlay address or an
/// additional one (multi-IP nodes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAssignment {
    pub id: IpAssignmentId,
    pub pool_id: IpPoolId,
    pub group_id: Option<IpGroupId>,
    pub node_id: NodeId,
    pub address: Ipv4Addr,
    pub is_primary: bool,
    pub assigned_at: DateTime<Utc>,
}

/// A named collection of nodes, referenced by firewall rules and by
/// `UserGroup` scoping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Transport protocol a firewall rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallProto {
    Tcp,
    Udp,
    Icmp,
    Any,
}

/// Traffic direction a firewall rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirewallDirection {
    Inbound,
    Outbound,
}

/// A single allow rule. Fields mirror the compiled Nebula YAML shape
/// directly (`{port, proto, host|cidr|local_cidr|ca_name|ca_sha|group|groups}`)
/// so `nebula-netconfig`'s emission is a near-literal transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallRule {
    pub id: FirewallRuleId,
    pub ruleset_id: FirewallRulesetId,
    pub direction: FirewallDirection,
    pub proto: FirewallProto,
    /// Single port, inclusive range like `"200-901"`, or `"any"`.
    pub port: String,
    pub host: Option<String>,
    pub cidr: Option<Ipv4Net>,
    pub local_cidr: Option<Ipv4Net>,
    pub ca_name: Option<String>,
    pub ca_sha: Option<String>,
    pub group: Option<String>,
    pub groups: Vec<String>,
}

/// A named, ordered collection of [`FirewallRule`]s assignable to one or
/// more [`Node`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallRuleset {
    pub id: FirewallRulesetId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A single `(resource, action)` capability grant attachable to a
/// [`UserGroup`] (e.g. `resource = "nodes"`, `action = "write"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub resource: String,
    pub action: String,
}

/// An administrative group of users sharing a permission set. Admin
/// membership is modeled solely via `is_admin`; there is no separate
/// role/role_id field (see `DESIGN.md`, Open Question 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: UserGroupId,
    pub name: String,
    pub is_admin: bool,
    pub user_ids: Vec<UserId>,
    pub permission_ids: Vec<PermissionId>,
    pub created_at: DateTime<Utc>,
}

/// A finer-grained grant of one user's rights over one node, layered on top
/// of whatever a `UserGroup` already grants (spec's "ClientPermission"
/// rows).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClientPermission {
    pub id: ClientPermissionId,
    pub node_id: NodeId,
    pub user_id: UserId,
    pub can_view: bool,
    pub can_update: bool,
    pub can_download_config: bool,
    pub can_view_token: bool,
    pub can_download_docker_config: bool,
}

/// Fleet-wide defaults applied at first boot and editable by admins
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub lighthouse_port: u16,
    /// `<public_ip>:<port>` entries advertised for lighthouses that have no
    /// per-node `public_ip` override.
    pub lighthouse_public_addrs: Vec<String>,
    pub punchy_enabled: bool,
    pub default_cidr_pool: Option<Ipv4Net>,
    pub cert_version: CertVersion,
    pub nebula_version: Option<semver::Version>,
    pub client_docker_image: String,
    pub server_url: String,
    /// `{{placeholder}}` template rendered by `GET /v1/clients/{id}/docker-compose`.
    pub docker_compose_template: String,
}

/// A single opaque key/value row for settings that don't belong in
/// [`GlobalSettings`] proper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSetting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

/// Well-known `SystemSetting` keys.
pub mod system_setting_keys {
    pub const TOKEN_PREFIX: &str = "token_prefix";
    pub const GITHUB_WEBHOOK_SECRET: &str = "github_webhook_secret";
    pub const LATEST_CLIENT_VERSION: &str = "latest_client_version";
    pub const LATEST_NEBULA_VERSION: &str = "latest_nebula_version";
    pub const CACHED_CLIENT_ADVISORIES: &str = "cached_client_advisories";
    pub const CACHED_NEBULA_ADVISORIES: &str = "cached_nebula_advisories";
    pub const VERSION_CACHE_LAST_CHECKED: &str = "version_cache_last_checked";
}

/// The default token prefix used when `SystemSetting(token_prefix)` has
/// never been set.
pub const DEFAULT_TOKEN_PREFIX: &str = "mnebula_";

/// A single-use, time-bounded code letting a new device complete
/// enrollment without an administrator copying a raw token by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentCode {
    pub id: EnrollmentCodeId,
    pub node_id: NodeId,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl EnrollmentCode {
    /// Whether the code can still be redeemed.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now <= self.expires_at
    }
}

/// One row written by the GitHub secret-scanning partner webhook each time
/// it revokes (or attempts to revoke) a leaked token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAuditRow {
    pub id: WebhookAuditRowId,
    pub action: String,
    pub token_preview: String,
    pub github_url: String,
    pub is_active: bool,
    pub node_id: Option<NodeId>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Duration;

    use super::*;

    fn sample_ca() -> Ca {
        let now = Utc::now();
        Ca {
            id: CaId::new(),
            name: "root".into(),
            cert_pem: String::new(),
            key_pem: Some(String::new()),
            not_before: now - Duration::days(1),
            not_after: now + Duration::days(365),
            is_active: true,
            is_previous: false,
            can_sign: true,
            include_in_config: true,
            cert_version: CertVersion::V1,
            nebula_version: None,
            created_at: now,
        }
    }

    #[test]
    fn ca_validity_window_and_signing() {
        let now = Utc::now();
        let ca = sample_ca();
        assert!(ca.is_valid_at(now));
        assert!(ca.is_signing());
        assert!(!ca.is_valid_at(now - Duration::days(2)));
    }

    #[test]
    fn demoted_ca_is_not_signing() {
        let mut ca = sample_ca();
        ca.is_previous = true;
        ca.can_sign = false;
        assert!(!ca.is_signing());
        assert!(ca.include_in_config);
    }

    #[test]
    fn enrollment_code_expires() {
        let now = Utc::now();
        let code = EnrollmentCode {
            id: EnrollmentCodeId::new(),
            node_id: NodeId::new(),
            code: "ABC123".into(),
            expires_at: now - Duration::minutes(1),
            used_at: None,
        };
        assert!(!code.is_valid_at(now));
    }

    #[test]
    fn ip_pool_cidr_parses() {
        let pool = IpPool {
            id: IpPoolId::new(),
            cidr: Ipv4Net::from_str("10.0.0.0/16").unwrap(),
            description: None,
            created_at: Utc::now(),
        };
        assert_eq!(pool.cidr.prefix_len(), 16);
    }

    #[test]
    fn ip_version_requires_v2_matches_multi_and_ipv6_topologies() {
        assert!(!IpVersion::Ipv4Only.requires_v2());
        assert!(IpVersion::DualStack.requires_v2());
        assert!(IpVersion::MultiIpv4.requires_v2());
    }

    #[test]
    fn host_cert_headroom() {
        let now = Utc::now();
        let cert = HostCert {
            id: HostCertId::new(),
            node_id: NodeId::new(),
            cert_pem: String::new(),
            not_before: now,
            not_after: now + Duration::days(10),
            fingerprint: None,
            issued_for_ip_cidr: "10.0.0.1/16".into(),
            issued_for_groups_hash: String::new(),
            issued_by_ca_id: CaId::new(),
            cert_version: CertVersion::V1,
            revoked: false,
            revoked_at: None,
            created_at: now,
        };
        assert!(cert.has_headroom(now, Duration::days(7)));
        assert!(!cert.has_headroom(now + Duration::days(4), Duration::days(7)));
    }
}
