//! The node-side daemon (spec §4.5): persists a config bundle fetched from
//! the control plane, supervises the local Nebula process, and upgrades the
//! Nebula binary when the control plane's target version drifts.
//!
//! [`cycle::run_once`] drives one fetch → diff → write → restart pass;
//! [`monitor::run`] is the background crash-recovery loop used in
//! `--monitor` mode; [`supervisor::Supervisor`] owns the process lifecycle
//! both share.

pub mod client;
pub mod config;
pub mod cycle;
pub mod keypair;
pub mod metrics;
pub mod monitor;
pub mod nebula_cli;
pub mod paths;
pub mod reconcile;
pub mod supervisor;
pub mod upgrader;

pub use config::AgentConfig;
pub use cycle::run_once;
pub use paths::StatePaths;
pub use supervisor::{Supervisor, SupervisorState};
