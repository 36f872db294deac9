#![warn(missing_docs)]

//! # Nebula Cert
//!
//! CA lifecycle (creation, daily rotation, overlap cleanup, import) and
//! host-certificate issuance, all delegated to the external `nebula-cert`
//! CLI (spec §6) rather than reimplemented cryptography. The rotation/
//! overlap shape mirrors the teacher's credential grace-period idiom:
//! `is_previous`/`is_active` on [`nebula_core::Ca`] play the role the
//! teacher's `GracePeriodState` plays for a rotating credential.

pub mod cli;
pub mod fingerprint;
pub mod manager;
pub mod secure;

pub use cli::{CertCli, CertInfo, DEFAULT_SUBPROCESS_TIMEOUT};
pub use manager::{CertManager, CertManagerConfig, IssueRequest};
pub use secure::SecurePem;
