//! The config half of the reconcile cycle (spec §4.5 steps 4-5): hash the
//! fetched bundle against what's on disk, and write-then-rename if it
//! changed so a crash mid-write never leaves a torn config behind.

use std::path::Path;

use nebula_error::Result;
use sha2::{Digest, Sha256};

use crate::client::FetchedConfig;
use crate::paths::StatePaths;

/// `SHA-256(config_yaml ∥ client_cert_pem ∥ join(ca_chain_pems))`, the
/// fingerprint that decides whether a restart is needed.
#[must_use]
pub fn config_hash(config_yaml: &str, client_cert_pem: &str, ca_chain_pems: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(config_yaml.as_bytes());
    hasher.update(client_cert_pem.as_bytes());
    for pem in ca_chain_pems {
        hasher.update(pem.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn current_hash(paths: &StatePaths) -> String {
    let Ok(config_yaml) = std::fs::read_to_string(paths.config_path()) else {
        return String::new();
    };
    let cert = std::fs::read_to_string(paths.cert_path()).unwrap_or_default();
    let ca = std::fs::read_to_string(paths.ca_path()).unwrap_or_default();
    config_hash(&config_yaml, &cert, &[ca])
}

/// Write `fetched`'s config/cert/CA files only if their combined hash
/// differs from what's currently on disk. Returns whether anything changed
/// (and therefore whether a restart is warranted).
pub fn write_config_and_pki(paths: &StatePaths, fetched: &FetchedConfig) -> Result<bool> {
    let ca_chain = fetched.ca_chain_pems.join("");
    let new_hash = config_hash(&fetched.config, &fetched.client_cert_pem, &[ca_chain.clone()]);
    if new_hash == current_hash(paths) {
        return Ok(false);
    }

    if let Some(parent) = paths.config_path().parent() {
        std::fs::create_dir_all(parent)?;
    }
    atomic_write(paths.config_path(), &fetched.config)?;
    atomic_write(&paths.cert_path(), &fetched.client_cert_pem)?;
    atomic_write(&paths.ca_path(), &ca_chain)?;
    Ok(true)
}

/// Write to a sibling temp file, then rename into place. `rename` is atomic
/// on both POSIX and Windows NTFS, so a concurrent reader of `path` never
/// observes a partially written file.
fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> FetchedConfig {
        FetchedConfig {
            config: "listen: {}".into(),
            client_cert_pem: "cert".into(),
            ca_chain_pems: vec!["ca".into()],
        }
    }

    #[test]
    fn hash_is_stable_for_identical_inputs() {
        let a = config_hash("yaml", "cert", &["ca".to_string()]);
        let b = config_hash("yaml", "cert", &["ca".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_changes_when_any_component_changes() {
        let base = config_hash("yaml", "cert", &["ca".to_string()]);
        assert_ne!(base, config_hash("yaml2", "cert", &["ca".to_string()]));
        assert_ne!(base, config_hash("yaml", "cert2", &["ca".to_string()]));
        assert_ne!(base, config_hash("yaml", "cert", &["ca2".to_string()]));
    }

    #[test]
    fn first_write_reports_changed_and_persists_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::new(dir.path(), dir.path().join("config.yml"));
        let changed = write_config_and_pki(&paths, &sample()).unwrap();
        assert!(changed);
        assert_eq!(std::fs::read_to_string(paths.config_path()).unwrap(), "listen: {}");
        assert_eq!(std::fs::read_to_string(paths.cert_path()).unwrap(), "cert");
        assert_eq!(std::fs::read_to_string(paths.ca_path()).unwrap(), "ca");
    }

    #[test]
    fn identical_refetch_reports_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::new(dir.path(), dir.path().join("config.yml"));
        assert!(write_config_and_pki(&paths, &sample()).unwrap());
        assert!(!write_config_and_pki(&paths, &sample()).unwrap());
    }

    #[test]
    fn a_changed_fetch_reports_changed_again() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::new(dir.path(), dir.path().join("config.yml"));
        assert!(write_config_and_pki(&paths, &sample()).unwrap());
        let mut updated = sample();
        updated.config = "listen: { port: 1 }".into();
        assert!(write_config_and_pki(&paths, &updated).unwrap());
    }
}
