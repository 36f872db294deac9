//! # Nebula Core
//!
//! Shared domain types for the Nebula fleet control plane: entity
//! identifiers and the entities themselves (`Ca`, `Node`, `Token`,
//! `HostCert`, IP allocation, groups, firewall rules, permissions, and
//! fleet-wide settings). Every other crate in the workspace depends on this
//! one for its vocabulary.

pub mod id;
pub mod types;

pub use id::{
    CaId, ClientPermissionId, EnrollmentCodeId, FirewallRuleId, FirewallRulesetId, GroupId,
    HostCertId, IpAssignmentId, IpGroupId, IpPoolId, NodeId, PermissionId, TokenId, UserGroupId,
    UserId, WebhookAuditRowId,
};
pub use types::{
    Ca, CertVersion, ClientPermission, DEFAULT_TOKEN_PREFIX, EnrollmentCode, FirewallDirection,
    FirewallProto, FirewallRule, FirewallRuleset, GlobalSettings, Group, HostCert, IpAssignment,
    IpGroup, IpPool, IpVersion, Node, OsType, Permission, SystemSetting, Token, UserGroup,
    WebhookAuditRow, system_setting_keys,
};

/// Common prelude for crates consuming `nebula-core`.
pub mod prelude {
    pub use crate::{
        Ca, CaId, CertVersion, ClientPermission, ClientPermissionId, EnrollmentCode,
        EnrollmentCodeId, FirewallDirection, FirewallProto, FirewallRule, FirewallRuleId,
        FirewallRuleset, FirewallRulesetId, GlobalSettings, Group, GroupId, HostCert, HostCertId,
        IpAssignment, IpAssignmentId, IpGroup, IpGroupId, IpPool, IpPoolId, IpVersion, Node,
        NodeId, OsType, Permission, PermissionId, SystemSetting, Token, TokenId, UserGroup,
        UserGroupId, UserId, WebhookAuditRow, WebhookAuditRowId,
    };
}
