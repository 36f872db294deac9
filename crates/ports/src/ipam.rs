//! IP allocation repository port: pools, sub-range groups, and assignments.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use nebula_core::{IpAssignment, IpAssignmentId, IpGroup, IpGroupId, IpPool, IpPoolId, NodeId};
use nebula_error::Result;

/// Persistence for IP pools, their sub-range groups, and allocations.
#[async_trait]
pub trait IpamRepo: Send + Sync {
    /// Persist a newly created pool.
    async fn create_pool(&self, pool: IpPool) -> Result<()>;

    /// Fetch a pool by ID.
    async fn get_pool(&self, id: IpPoolId) -> Result<IpPool>;

    /// All pools.
    async fn list_pools(&self) -> Result<Vec<IpPool>>;

    /// Persist a newly created sub-range group.
    async fn create_group(&self, group: IpGroup) -> Result<()>;

    /// All sub-range groups within a pool.
    async fn list_groups(&self, pool_id: IpPoolId) -> Result<Vec<IpGroup>>;

    /// Fetch a sub-range group by ID.
    async fn get_group(&self, id: IpGroupId) -> Result<IpGroup>;

    /// All addresses currently assigned within a pool, used by the
    /// allocator's scan-and-skip search.
    async fn list_assignments(&self, pool_id: IpPoolId) -> Result<Vec<IpAssignment>>;

    /// All addresses assigned to one node.
    async fn list_assignments_for_node(&self, node_id: NodeId) -> Result<Vec<IpAssignment>>;

    /// Persist a new assignment. Must fail with `ErrorKind::Conflict` if
    /// `address` is already assigned within `pool_id`.
    async fn create_assignment(&self, assignment: IpAssignment) -> Result<()>;

    /// Release one assignment.
    async fn delete_assignment(&self, id: IpAssignmentId) -> Result<()>;

    /// Quick membership check used before inserting, to surface a clean
    /// conflict error instead of relying on a unique-constraint violation.
    async fn is_assigned(&self, pool_id: IpPoolId, address: Ipv4Addr) -> Result<bool>;
}
