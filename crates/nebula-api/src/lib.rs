#![warn(missing_docs)]

//! # Nebula API
//!
//! The fleet control plane's HTTP surface (spec §6): client config
//! distribution, node/CA/IPAM/ACL CRUD, and the daily CA scheduler. No
//! teacher crate shipped handler source for this surface (`crates/api` was
//! an empty Cargo.toml scaffold); its dependency shape is reused as-is and
//! the handler style is grounded on the axum idiom the rest of the example
//! pack uses: thin extractor-based handlers, `#[instrument]` on anything
//! that touches a repository, error conversion at the boundary via
//! [`error::ApiError`].

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod router;
pub mod scheduler;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use router::build_router;
pub use state::AppState;
