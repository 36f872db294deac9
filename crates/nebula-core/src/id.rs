//! Newtype identifiers for every entity in the fleet data model.
//!
//! Each ID wraps a `Uuid` and derives `Display`/`FromStr` so it round-trips
//! through URL path segments and JSON without a manual `impl` at every call
//! site, while keeping e.g. a `NodeId` from being accidentally passed where
//! a `CaId` is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(CaId);
uuid_id!(NodeId);
uuid_id!(TokenId);
uuid_id!(HostCertId);
uuid_id!(IpPoolId);
uuid_id!(IpGroupId);
uuid_id!(IpAssignmentId);
uuid_id!(GroupId);
uuid_id!(FirewallRuleId);
uuid_id!(FirewallRulesetId);
uuid_id!(PermissionId);
uuid_id!(UserGroupId);
uuid_id!(ClientPermissionId);
uuid_id!(EnrollmentCodeId);
uuid_id!(UserId);
uuid_id!(WebhookAuditRowId);

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ids_of_the_same_type_are_distinguishable() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn round_trips_through_display_and_from_str() {
        let id = CaId::new();
        let parsed: CaId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_round_trip_is_a_bare_json_string() {
        let id = TokenId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
        let back: TokenId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
