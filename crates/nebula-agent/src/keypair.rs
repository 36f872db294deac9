//! Step 1 of the reconcile cycle (spec §4.5): ensure the node's static
//! keypair exists, generating it with `nebula-cert keygen` on first run, and
//! lock its permissions down to the agent's own account.

use std::path::Path;

use nebula_cert::CertCli;
use nebula_error::Result;

use crate::paths::StatePaths;

/// The node's persistent identity: a private key the agent never sends
/// anywhere, and the public key handed to the control plane on every fetch.
#[derive(Debug, Clone)]
pub struct Keypair {
    pub private_key_pem: String,
    pub public_key_pem: String,
}

/// Generate the keypair if it doesn't already exist, then read it back.
/// Idempotent: a second call with an existing keypair just re-reads it.
pub async fn ensure_keypair(paths: &StatePaths, cert_cli: &CertCli) -> Result<Keypair> {
    std::fs::create_dir_all(paths.state_dir())?;
    let key_path = paths.key_path();
    let pub_path = paths.pub_path();

    if !key_path.exists() || !pub_path.exists() {
        cert_cli.keygen(paths.state_dir(), &key_path, &pub_path).await?;
        restrict_permissions(&key_path)?;
    }

    Ok(Keypair {
        private_key_pem: std::fs::read_to_string(&key_path)?,
        public_key_pem: std::fs::read_to_string(&pub_path)?,
    })
}

/// Restrict the private key to the agent's own account: owner-only
/// read/write on Unix, an ACL granting only SYSTEM and Administrators on
/// Windows.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(windows)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use nebula_error::NebulaError;
    use windows_acl::acl::ACL;
    use windows_acl::helper::sid_to_string;

    let path_str = path.to_string_lossy().into_owned();
    let mut acl = ACL::from_file_path(&path_str, false)
        .map_err(|e| NebulaError::io(format!("failed to open ACL for {path_str}: {e:?}")))?;

    // Clear existing entries, then grant full control only to SYSTEM and
    // the local Administrators group -- nobody else gets to read the key.
    for entry in acl.all().unwrap_or_default() {
        if let Some(sid) = entry.sid.as_ref() {
            if let Ok(sid_string) = sid_to_string(sid) {
                let _ = acl.remove(sid, None, None).ok();
                let _ = sid_string;
            }
        }
    }

    for well_known_sid in ["S-1-5-18", "S-1-5-32-544"] {
        if let Ok(mut sid) = windows_acl::helper::string_to_sid(well_known_sid) {
            let _ = acl.allow(sid.as_mut_ptr().cast(), true, 0x1F_01FF);
        }
    }

    Ok(())
}
