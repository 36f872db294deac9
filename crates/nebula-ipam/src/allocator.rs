//! Pool bootstrap and scan-and-skip address allocation.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::Utc;
use ipnet::Ipv4Net;
use nebula_core::{IpAssignment, IpAssignmentId, IpGroup, IpGroupId, IpPool, IpPoolId, NodeId};
use nebula_error::{ErrorKind, NebulaError, Result};
use nebula_ports::{IpamRepo, SettingsRepo};
use tracing::instrument;

/// Allocates overlay addresses out of [`IpPool`]s, optionally clipped to an
/// [`IpGroup`] sub-range.
pub struct IpAllocator {
    ipam: Arc<dyn IpamRepo>,
    settings: Arc<dyn SettingsRepo>,
}

impl IpAllocator {
    /// Build an allocator around the given repositories.
    #[must_use]
    pub fn new(ipam: Arc<dyn IpamRepo>, settings: Arc<dyn SettingsRepo>) -> Self {
        Self { ipam, settings }
    }

    /// On startup, ensures a pool covers `GlobalSettings.default_cidr_pool`,
    /// creating one if none does.
    ///
    /// # Errors
    /// `ErrorKind::Validation` if no default pool CIDR is configured.
    #[instrument(skip(self))]
    pub async fn ensure_default_pool(&self) -> Result<IpPool> {
        let settings = self.settings.get_global().await?;
        let cidr = settings.default_cidr_pool.ok_or_else(|| {
            NebulaError::validation("GlobalSettings.default_cidr_pool is not configured")
        })?;

        if let Some(existing) = self.ipam.list_pools().await?.into_iter().find(|p| p.cidr == cidr)
        {
            return Ok(existing);
        }

        let pool = IpPool {
            id: IpPoolId::new(),
            cidr,
            description: Some("default pool".to_string()),
            created_at: Utc::now(),
        };
        self.ipam.create_pool(pool.clone()).await?;
        Ok(pool)
    }

    /// Allocate the node's primary address from `pool_id`. Fails with
    /// `ErrorKind::Conflict` if the node already has a primary assignment —
    /// every pool in this implementation is IPv4, so "one primary per IP
    /// version" collapses to "one primary per node".
    #[instrument(skip(self))]
    pub async fn allocate_primary(&self, pool_id: IpPoolId, node_id: NodeId) -> Result<IpAssignment> {
        let has_primary = self
            .ipam
            .list_assignments_for_node(node_id)
            .await?
            .iter()
            .any(|a| a.is_primary);
        if has_primary {
            return Err(NebulaError::conflict("node already has a primary IP assignment"));
        }
        self.allocate(pool_id, None, node_id, true).await
    }

    /// Allocate an additional (non-primary) address for a multi-IP node,
    /// optionally clipped to an [`IpGroup`] sub-range.
    #[instrument(skip(self))]
    pub async fn allocate_additional(
        &self,
        pool_id: IpPoolId,
        group_id: Option<IpGroupId>,
        node_id: NodeId,
    ) -> Result<IpAssignment> {
        self.allocate(pool_id, group_id, node_id, false).await
    }

    /// Release one assignment, e.g. when a node is deleted or its IP
    /// version no longer needs the address.
    pub async fn release(&self, assignment_id: IpAssignmentId) -> Result<()> {
        self.ipam.delete_assignment(assignment_id).await
    }

    async fn allocate(
        &self,
        pool_id: IpPoolId,
        group_id: Option<IpGroupId>,
        node_id: NodeId,
        is_primary: bool,
    ) -> Result<IpAssignment> {
        let pool = self.ipam.get_pool(pool_id).await?;
        let (lo, hi) = match group_id {
            Some(id) => {
                let group: IpGroup = self.ipam.get_group(id).await?;
                if group.pool_id != pool_id {
                    return Err(NebulaError::validation("IP group does not belong to this pool"));
                }
                (group.start, group.end)
            }
            None => (pool.cidr.network(), pool.cidr.broadcast()),
        };

        let taken: HashSet<Ipv4Addr> = self
            .ipam
            .list_assignments(pool_id)
            .await?
            .into_iter()
            .map(|a| a.address)
            .collect();

        for addr in usable_hosts(pool.cidr) {
            if addr < lo || addr > hi || taken.contains(&addr) {
                continue;
            }
            let assignment = IpAssignment {
                id: IpAssignmentId::new(),
                pool_id,
                group_id,
                node_id,
                address: addr,
                is_primary,
                assigned_at: Utc::now(),
            };
            match self.ipam.create_assignment(assignment.clone()).await {
                Ok(()) => return Ok(assignment),
                // Lost a race with a concurrent allocator; the address is
                // gone, try the next candidate.
                Err(err) if err.kind() == ErrorKind::Conflict => continue,
                Err(err) => return Err(err),
            }
        }
        Err(NebulaError::not_found("free address in pool", pool_id.to_string()))
    }
}

/// Host addresses in a CIDR, network and broadcast excluded, in ascending
/// order. `/31` and `/32` yield nothing — this implementation doesn't use
/// the RFC 3021 point-to-point exception.
fn usable_hosts(net: Ipv4Net) -> impl Iterator<Item = Ipv4Addr> {
    let start = u32::from(net.network()).saturating_add(1);
    let end = u32::from(net.broadcast());
    (start..end).map(Ipv4Addr::from)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn usable_hosts_excludes_network_and_broadcast() {
        let net = Ipv4Net::from_str("10.0.0.0/30").unwrap();
        let hosts: Vec<_> = usable_hosts(net).collect();
        assert_eq!(hosts, vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]);
    }

    #[test]
    fn slash_31_has_zero_usable_hosts() {
        let net = Ipv4Net::from_str("10.0.0.0/31").unwrap();
        assert_eq!(usable_hosts(net).count(), 0);
    }

    #[test]
    fn slash_32_has_zero_usable_hosts() {
        let net = Ipv4Net::from_str("10.0.0.5/32").unwrap();
        assert_eq!(usable_hosts(net).count(), 0);
    }

    #[test]
    fn usable_hosts_of_a_slash_16_starts_at_dot_one() {
        let net = Ipv4Net::from_str("10.100.0.0/16").unwrap();
        let mut hosts = usable_hosts(net);
        assert_eq!(hosts.next(), Some(Ipv4Addr::new(10, 100, 0, 1)));
    }
}
