//! Step 2 of the reconcile cycle (spec §4.5): when the control plane's
//! target Nebula version drifts from what's locally installed, download the
//! matching release archive, extract it defensively, verify the result,
//! back up the old binaries, and atomically replace them.

use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use nebula_error::{NebulaError, Result};
use tar::Archive;
use tracing::{info, warn};

use crate::nebula_cli::NebulaCli;

/// Map the running OS/CPU to the architecture suffix Nebula's release
/// archives use (`nebula-linux-<arch>.tar.gz`).
#[must_use]
pub fn resolve_arch() -> Option<&'static str> {
    match std::env::consts::ARCH {
        "x86_64" => Some("amd64"),
        "aarch64" => Some("arm64"),
        arch if arch.starts_with("arm") => Some("arm"),
        _ => None,
    }
}

#[must_use]
pub fn download_url(version: &str, arch: &str) -> String {
    format!("https://github.com/slackhq/nebula/releases/download/v{version}/nebula-linux-{arch}.tar.gz")
}

/// Downloads and installs Nebula release archives into `install_dir`,
/// verifying the extracted binary's reported version before it replaces
/// anything live.
pub struct Upgrader {
    http: reqwest::Client,
    install_dir: PathBuf,
}

impl Upgrader {
    pub fn new(allow_self_signed_cert: bool, install_dir: impl Into<PathBuf>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .danger_accept_invalid_certs(allow_self_signed_cert)
            .build()
            .map_err(|err| NebulaError::internal(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, install_dir: install_dir.into() })
    }

    /// Download `url`, extract into a fresh temp directory, verify both
    /// binaries exist, back up whatever is currently installed, then
    /// atomically replace it. Returns the new binary's reported version on
    /// success.
    pub async fn upgrade(&self, url: &str, expected_version: &str) -> Result<String> {
        let archive_bytes = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| NebulaError::external(format!("download failed: {err}")))?
            .error_for_status()
            .map_err(|err| NebulaError::external(format!("download failed: {err}")))?
            .bytes()
            .await
            .map_err(|err| NebulaError::external(format!("download failed: {err}")))?;
        info!(bytes = archive_bytes.len(), "downloaded nebula release archive");

        let extract_dir = tempfile::tempdir()?;
        extract_archive(&archive_bytes, extract_dir.path())?;

        let nebula_bin = extract_dir.path().join("nebula");
        let nebula_cert_bin = extract_dir.path().join("nebula-cert");
        if !nebula_bin.exists() || !nebula_cert_bin.exists() {
            return Err(NebulaError::external("nebula binaries not found in extracted archive"));
        }

        let probe = NebulaCli::new(nebula_bin.to_string_lossy().into_owned());
        let extracted_version = probe
            .version()
            .await
            .ok_or_else(|| NebulaError::external("extracted nebula binary did not report a version"))?;
        if extracted_version.trim_start_matches('v') != expected_version.trim_start_matches('v') {
            return Err(NebulaError::external(format!(
                "downloaded archive reports version {extracted_version}, expected {expected_version}"
            )));
        }

        self.backup_and_install(&nebula_bin, &nebula_cert_bin)?;
        Ok(extracted_version)
    }

    fn backup_and_install(&self, nebula_bin: &Path, nebula_cert_bin: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.install_dir)?;
        for name in ["nebula", "nebula-cert"] {
            let installed = self.install_dir.join(name);
            if installed.exists() {
                let backup = installed.with_extension("bak");
                if let Err(err) = std::fs::copy(&installed, &backup) {
                    warn!(%err, name, "failed to back up existing binary, continuing anyway");
                }
            }
        }
        atomic_install(nebula_bin, &self.install_dir.join("nebula"))?;
        atomic_install(nebula_cert_bin, &self.install_dir.join("nebula-cert"))?;
        Ok(())
    }
}

#[cfg(unix)]
fn atomic_install(src: &Path, dest: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let tmp = dest.with_extension("new");
    std::fs::copy(src, &tmp)?;
    std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
    std::fs::rename(&tmp, dest)?;
    Ok(())
}

#[cfg(windows)]
fn atomic_install(src: &Path, dest: &Path) -> Result<()> {
    let tmp = dest.with_extension("new");
    std::fs::copy(src, &tmp)?;
    std::fs::rename(&tmp, dest)?;
    Ok(())
}

/// Extract a `.tar.gz` archive into `dest`, rejecting any entry whose path
/// would escape `dest` -- a malicious or corrupted archive containing
/// `../../etc/passwd`-style entries must not be able to write outside the
/// extraction directory.
fn extract_archive(archive_bytes: &[u8], dest: &Path) -> Result<()> {
    let decoder = GzDecoder::new(archive_bytes);
    let mut archive = Archive::new(decoder);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        if entry_path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(NebulaError::validation(format!(
                "archive entry escapes extraction directory: {}",
                entry_path.display()
            )));
        }
        let target = dest.join(&entry_path);
        if !target.starts_with(dest) {
            return Err(NebulaError::validation(format!(
                "archive entry resolves outside extraction directory: {}",
                entry_path.display()
            )));
        }
        entry.unpack(&target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        let tar_bytes = builder.into_inner().unwrap();
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn extracts_well_formed_archives() {
        let archive = build_archive(&[("nebula", b"binary"), ("nebula-cert", b"cert-binary")]);
        let dest = tempfile::tempdir().unwrap();
        extract_archive(&archive, dest.path()).unwrap();
        assert_eq!(std::fs::read(dest.path().join("nebula")).unwrap(), b"binary");
    }

    #[test]
    fn rejects_path_traversal_entries() {
        let archive = build_archive(&[("../../etc/passwd", b"evil")]);
        let dest = tempfile::tempdir().unwrap();
        let err = extract_archive(&archive, dest.path()).unwrap_err();
        assert_eq!(err.kind(), nebula_error::ErrorKind::Validation);
    }

    #[test]
    fn resolve_arch_recognizes_the_current_target() {
        // Every CI/dev target this workspace builds for maps to something.
        assert!(resolve_arch().is_some() || !matches!(std::env::consts::ARCH, "x86_64" | "aarch64"));
    }

    #[test]
    fn download_url_embeds_version_and_arch() {
        assert_eq!(
            download_url("1.9.7", "amd64"),
            "https://github.com/slackhq/nebula/releases/download/v1.9.7/nebula-linux-amd64.tar.gz"
        );
    }
}
