#![warn(missing_docs)]

//! # Nebula IPAM
//!
//! Deterministic, contention-free allocation of overlay IPv4 addresses
//! within pools (spec §4.2). The scan-and-skip allocation loop mirrors the
//! teacher's resource pool's idle-list scan: walk candidates in order,
//! skip the ones already taken, and retry on a lost race rather than
//! failing outright.

mod allocator;

pub use allocator::IpAllocator;
