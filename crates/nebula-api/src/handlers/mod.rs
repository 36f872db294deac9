//! Request handlers, one module per spec §6 surface area.

pub mod acl;
pub mod ca;
pub mod client_config;
pub mod enroll;
pub mod health;
pub mod ipam;
pub mod nodes;
