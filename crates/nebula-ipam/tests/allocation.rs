//! Exercises `IpAllocator` against the in-memory repository driver.

use std::str::FromStr;
use std::sync::Arc;

use ipnet::Ipv4Net;
use nebula_core::{GlobalSettings, IpPool, IpPoolId, NodeId};
use nebula_ipam::IpAllocator;
use nebula_ports::{IpamRepo, SettingsRepo};
use nebula_repo_memory::MemoryStore;

fn settings_with_pool(cidr: &str) -> GlobalSettings {
    GlobalSettings {
        lighthouse_port: 4242,
        lighthouse_public_addrs: Vec::new(),
        punchy_enabled: false,
        default_cidr_pool: Some(Ipv4Net::from_str(cidr).unwrap()),
        cert_version: nebula_core::CertVersion::V1,
        nebula_version: None,
        client_docker_image: String::new(),
        server_url: String::new(),
        docker_compose_template: String::new(),
    }
}

#[tokio::test]
async fn bootstrap_creates_default_pool_and_assigns_dot_one() {
    let store = Arc::new(MemoryStore::default());
    store.put_global(settings_with_pool("10.100.0.0/16")).await.unwrap();
    let allocator = IpAllocator::new(store.clone(), store.clone());

    let pool = allocator.ensure_default_pool().await.unwrap();
    assert_eq!(pool.cidr, Ipv4Net::from_str("10.100.0.0/16").unwrap());

    let node_id = NodeId::new();
    let assignment = allocator.allocate_primary(pool.id, node_id).await.unwrap();
    assert_eq!(assignment.address, "10.100.0.1".parse().unwrap());
    assert!(assignment.is_primary);
}

#[tokio::test]
async fn ensure_default_pool_is_idempotent() {
    let store = Arc::new(MemoryStore::default());
    store.put_global(settings_with_pool("10.100.0.0/24")).await.unwrap();
    let allocator = IpAllocator::new(store.clone(), store.clone());

    let first = allocator.ensure_default_pool().await.unwrap();
    let second = allocator.ensure_default_pool().await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(store.list_pools().await.unwrap().len(), 1);
}

#[tokio::test]
async fn second_primary_for_same_node_conflicts() {
    let store = Arc::new(MemoryStore::default());
    store.put_global(settings_with_pool("10.100.0.0/24")).await.unwrap();
    let allocator = IpAllocator::new(store.clone(), store.clone());
    let pool = allocator.ensure_default_pool().await.unwrap();
    let node_id = NodeId::new();

    allocator.allocate_primary(pool.id, node_id).await.unwrap();
    let err = allocator.allocate_primary(pool.id, node_id).await.unwrap_err();
    assert_eq!(err.kind(), nebula_error::ErrorKind::Conflict);
}

#[tokio::test]
async fn slash_31_pool_is_exhausted_on_first_allocation() {
    let store = Arc::new(MemoryStore::default());
    let pool = IpPool {
        id: IpPoolId::new(),
        cidr: Ipv4Net::from_str("10.0.0.0/31").unwrap(),
        description: None,
        created_at: chrono::Utc::now(),
    };
    store.create_pool(pool.clone()).await.unwrap();
    let allocator = IpAllocator::new(store.clone(), store.clone());

    let err = allocator.allocate_primary(pool.id, NodeId::new()).await.unwrap_err();
    assert_eq!(err.kind(), nebula_error::ErrorKind::NotFound);
}

#[tokio::test]
async fn exhausting_a_tiny_pool_then_freeing_an_address_allows_reuse() {
    let store = Arc::new(MemoryStore::default());
    let pool = IpPool {
        id: IpPoolId::new(),
        cidr: Ipv4Net::from_str("10.0.0.0/30").unwrap(),
        description: None,
        created_at: chrono::Utc::now(),
    };
    store.create_pool(pool.clone()).await.unwrap();
    let allocator = IpAllocator::new(store.clone(), store.clone());

    let a = allocator.allocate_primary(pool.id, NodeId::new()).await.unwrap();
    let b = allocator.allocate_primary(pool.id, NodeId::new()).await.unwrap();
    assert_ne!(a.address, b.address);

    // Only two usable hosts in a /30; a third allocation is exhausted.
    let err = allocator.allocate_primary(pool.id, NodeId::new()).await.unwrap_err();
    assert_eq!(err.kind(), nebula_error::ErrorKind::NotFound);

    allocator.release(a.id).await.unwrap();
    let c = allocator.allocate_primary(pool.id, NodeId::new()).await.unwrap();
    assert_eq!(c.address, a.address);
}
