#![warn(missing_docs)]

//! # Nebula Token
//!
//! Client bearer token generation, validation, and lifecycle (spec §4.4).
//! Grounded on the opaque-identifier idiom in `nebula-credential`'s
//! `CredentialId`: generate, validate a fixed format, never attempt to
//! decode meaning back out of the value.

mod generate;
mod manager;

pub use generate::{generate, is_valid_format, is_valid_prefix, preview};
pub use manager::TokenManager;
