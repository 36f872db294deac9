#![warn(missing_docs)]

//! # Nebula Webhook
//!
//! The GitHub secret-scanning partner integration (spec §4.4): a public,
//! HMAC-gated pattern-set/verify/revoke surface that lets GitHub notify this
//! fleet when a client token leaks into a public repository. The crate
//! existed as an empty scaffold in the teacher (`crates/webhook`, no
//! source); its Cargo.toml dependency shape is reused here.

mod model;
mod router;
mod service;
mod signature;

pub use model::{PatternEntry, RevokeResponse, TokenMatch, VerifyResult};
pub use router::router;
pub use service::WebhookService;
pub use signature::verify as verify_signature;
