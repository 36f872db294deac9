#![warn(missing_docs)]

//! # Nebula Net Config
//!
//! Cert-version negotiation and Nebula YAML assembly (spec §4.3, §6). No
//! teacher crate emits Nebula configs; the module split (negotiate / paths
//! / yaml / builder) instead mirrors `nebula-config`'s separation of
//! concerns (parsing/validation kept apart from the assembled document).

pub mod builder;
pub mod negotiate;
pub mod paths;
pub mod yaml;

pub use builder::{build_config, ConfigInputs, LighthouseEntry};
pub use negotiate::{filter_ca_bundle, negotiate_cert_version, supports_v2};
pub use paths::{paths_for, OsPaths};
pub use yaml::NebulaConfig;
