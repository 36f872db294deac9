//! CA lifecycle and host-certificate issuance.

use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use nebula_core::{Ca, CaId, CertVersion, HostCert, HostCertId, Node};
use nebula_error::{NebulaError, Result};
use nebula_ports::{CaRepo, HostCertRepo};
use tempfile::TempDir;
use tracing::{instrument, warn};

use crate::cli::CertCli;
use crate::fingerprint::groups_hash;

/// Tunable durations driving CA rotation and cert reuse, all expressed in
/// days to match spec.md's `*_days` configuration knobs.
#[derive(Debug, Clone, Copy)]
pub struct CertManagerConfig {
    /// Validity period of a freshly created CA.
    pub ca_default_validity_days: i64,
    /// How far ahead of expiry `ensure_future_ca` creates a successor.
    pub ca_rotate_at_days: i64,
    /// How long a demoted (`is_previous`) CA stays distributed before
    /// `cleanup_old_cas` deactivates it outright.
    pub ca_overlap_days: i64,
    /// Validity period of a freshly issued host certificate.
    pub client_cert_validity_days: i64,
    /// Minimum remaining validity a non-revoked cert needs to be reused
    /// instead of re-signed.
    pub reuse_threshold_days: i64,
}

impl Default for CertManagerConfig {
    fn default() -> Self {
        Self {
            ca_default_validity_days: 3650,
            ca_rotate_at_days: 182,
            ca_overlap_days: 30,
            client_cert_validity_days: 365,
            reuse_threshold_days: 7,
        }
    }
}

/// Inputs to [`CertManager::issue_or_rotate`].
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// The node the certificate is being issued for.
    pub node: Node,
    /// The node's PEM-encoded Nebula public key.
    pub public_key_pem: String,
    /// The node's primary overlay address.
    pub primary_ip: Ipv4Addr,
    /// CIDR prefix length of the pool `primary_ip` was allocated from.
    pub cidr_prefix: u8,
    /// The cert format negotiated by `ConfigBuilder`.
    pub cert_version: CertVersion,
    /// Additional `ip/prefix` strings for a v2 or hybrid multi-IP node;
    /// empty for a plain v1 single-IP cert.
    pub all_ips: Vec<String>,
    /// Names of the node's firewall-rule groups, hashed into the issuance
    /// fingerprint.
    pub group_names: Vec<String>,
}

/// Creates CAs, issues/rotates host certificates, and imports externally
/// generated CAs, all via the external `nebula-cert` binary.
pub struct CertManager {
    ca_repo: Arc<dyn CaRepo>,
    host_cert_repo: Arc<dyn HostCertRepo>,
    cli: CertCli,
    config: CertManagerConfig,
}

impl CertManager {
    /// Build a manager around the given repositories and CLI wrapper.
    #[must_use]
    pub fn new(
        ca_repo: Arc<dyn CaRepo>,
        host_cert_repo: Arc<dyn HostCertRepo>,
        cli: CertCli,
        config: CertManagerConfig,
    ) -> Self {
        Self { ca_repo, host_cert_repo, cli, config }
    }

    /// `createCA`: shells out to `nebula-cert ca`, demotes any existing
    /// signing CA of the same `cert_version`, and persists the result.
    ///
    /// # Errors
    /// `ErrorKind::Validation` if `cert_version == V2` and
    /// `server_nebula_version` doesn't satisfy the 1.10.0 gate (spec §4.3);
    /// `ErrorKind::External` if the subprocess fails.
    #[instrument(skip(self, server_nebula_version))]
    pub async fn create_ca(
        &self,
        name: &str,
        cert_version: CertVersion,
        server_nebula_version: Option<&semver::Version>,
    ) -> Result<Ca> {
        if cert_version == CertVersion::V2 {
            let satisfies = server_nebula_version
                .is_some_and(|v| *v >= semver::Version::new(1, 10, 0));
            if !satisfies {
                return Err(NebulaError::validation(
                    "v2 CA requires the server's configured Nebula version to be >= 1.10.0",
                ));
            }
        }

        let scratch = TempDir::new().map_err(NebulaError::from)?;
        self.cli.ca(scratch.path(), name, self.config.ca_default_validity_days * 24).await?;

        let cert_pem = read_pem(scratch.path(), "ca.crt").await?;
        let key_pem = read_pem(scratch.path(), "ca.key").await?;
        let info = self.cli.print_json(scratch.path(), &scratch.path().join("ca.crt")).await?;

        if let Some(previous) = self.ca_repo.active_signing(cert_version).await? {
            self.ca_repo.demote(previous.id).await?;
        }

        let ca = Ca {
            id: CaId::new(),
            name: name.to_string(),
            cert_pem,
            key_pem: Some(key_pem),
            not_before: info.not_before,
            not_after: info.not_after,
            is_active: true,
            is_previous: false,
            can_sign: true,
            include_in_config: true,
            cert_version,
            nebula_version: server_nebula_version.cloned(),
            created_at: Utc::now(),
        };
        self.ca_repo.create(ca.clone()).await?;
        Ok(ca)
    }

    /// `ensureFutureCA`: runs daily from the scheduler. For each
    /// `cert_version` with a signing CA approaching expiry and no successor
    /// yet, creates `Rotated CA <date>`.
    #[instrument(skip(self))]
    pub async fn ensure_future_ca(&self, server_nebula_version: Option<&semver::Version>) -> Result<Vec<Ca>> {
        let now = Utc::now();
        let rotate_window = Duration::days(self.config.ca_rotate_at_days);
        let mut created = Vec::new();

        for cert_version in [CertVersion::V1, CertVersion::V2] {
            let Some(active) = self.ca_repo.active_signing(cert_version).await? else {
                continue;
            };
            if active.not_after - now > rotate_window {
                continue;
            }
            let has_successor = self
                .ca_repo
                .list()
                .await?
                .into_iter()
                .any(|ca| ca.cert_version == cert_version && ca.created_at > active.created_at);
            if has_successor {
                continue;
            }
            if cert_version == CertVersion::V2 && server_nebula_version.is_none() {
                warn!("skipping v2 CA rotation: no server Nebula version configured");
                continue;
            }
            let name = format!("Rotated CA {}", now.format("%Y-%m-%d"));
            created.push(self.create_ca(&name, cert_version, server_nebula_version).await?);
        }
        Ok(created)
    }

    /// `cleanupOldCAs`: runs daily from the scheduler. Deactivates every
    /// `is_previous` CA whose overlap window has elapsed.
    #[instrument(skip(self))]
    pub async fn cleanup_old_cas(&self) -> Result<usize> {
        let now = Utc::now();
        let overlap = Duration::days(self.config.ca_overlap_days);
        let mut count = 0;
        for ca in self.ca_repo.list().await? {
            if ca.is_previous && ca.is_active && now - ca.created_at >= overlap {
                self.ca_repo.deactivate(ca.id).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// `importExistingCA`: stores a CA PEM pair as-is, deriving
    /// `not_before`/`not_after` from `nebula-cert print -json`.
    #[instrument(skip(self, cert_pem, key_pem))]
    pub async fn import_existing_ca(
        &self,
        name: &str,
        cert_pem: String,
        key_pem: String,
        cert_version: CertVersion,
    ) -> Result<Ca> {
        let scratch = TempDir::new().map_err(NebulaError::from)?;
        let cert_path = scratch.path().join("ca.crt");
        tokio::fs::write(&cert_path, &cert_pem).await.map_err(NebulaError::from)?;
        let info = self.cli.print_json(scratch.path(), &cert_path).await?;

        if let Some(previous) = self.ca_repo.active_signing(cert_version).await? {
            self.ca_repo.demote(previous.id).await?;
        }

        let ca = Ca {
            id: CaId::new(),
            name: name.to_string(),
            cert_pem,
            key_pem: Some(key_pem),
            not_before: info.not_before,
            not_after: info.not_after,
            is_active: true,
            is_previous: false,
            can_sign: true,
            include_in_config: true,
            cert_version,
            nebula_version: None,
            created_at: Utc::now(),
        };
        self.ca_repo.create(ca.clone()).await?;
        Ok(ca)
    }

    /// `importPublicCA`: same as [`Self::import_existing_ca`] but without a
    /// private key, kept in the distributed bundle for peer-verification
    /// continuity over a CA this server can no longer sign with.
    #[instrument(skip(self, cert_pem))]
    pub async fn import_public_ca(
        &self,
        name: &str,
        cert_pem: String,
        cert_version: CertVersion,
    ) -> Result<Ca> {
        let scratch = TempDir::new().map_err(NebulaError::from)?;
        let cert_path = scratch.path().join("ca.crt");
        tokio::fs::write(&cert_path, &cert_pem).await.map_err(NebulaError::from)?;
        let info = self.cli.print_json(scratch.path(), &cert_path).await?;

        let ca = Ca {
            id: CaId::new(),
            name: name.to_string(),
            cert_pem,
            key_pem: None,
            not_before: info.not_before,
            not_after: info.not_after,
            is_active: false,
            is_previous: true,
            can_sign: false,
            include_in_config: true,
            cert_version,
            nebula_version: None,
            created_at: Utc::now(),
        };
        self.ca_repo.create(ca.clone()).await?;
        Ok(ca)
    }

    /// `issueOrRotate`: the 7-step reuse-or-sign algorithm (spec §4.1).
    #[instrument(skip(self, request), fields(node_id = %request.node.id))]
    pub async fn issue_or_rotate(&self, request: &IssueRequest) -> Result<HostCert> {
        let now = Utc::now();
        let ip_with_cidr = format!("{}/{}", request.primary_ip, request.cidr_prefix);
        let groups_hash = groups_hash(&request.group_names);

        if let Some(existing) =
            self.host_cert_repo.latest_non_revoked_for_node(request.node.id).await?
        {
            let reusable = is_reusable(
                &existing,
                &ip_with_cidr,
                &groups_hash,
                request.cert_version,
                now,
                Duration::days(self.config.reuse_threshold_days),
            );
            if reusable {
                let issuing_ca = self.ca_repo.get(existing.issued_by_ca_id).await?;
                if issuing_ca.is_signing() {
                    return Ok(existing);
                }
            }
        }

        let groups_csv =
            (!request.group_names.is_empty()).then(|| request.group_names.join(","));
        let duration_hours = self.config.client_cert_validity_days * 24;

        let (cert_pem, signing_ca_id, fingerprint) = if request.cert_version == CertVersion::Hybrid
        {
            // Step 5: hybrid issues a v1 single-IP cert and a v2 single-IP
            // cert and concatenates the PEMs. `issued_by_ca_id` records the
            // v2 CA, since that's the cert a v2-aware peer actually parses.
            let v1_ca = self.ca_repo.active_signing(CertVersion::V1).await?.ok_or_else(|| {
                NebulaError::not_found("signing CA", format!("{:?}", CertVersion::V1))
            })?;
            let v2_ca = self.ca_repo.active_signing(CertVersion::V2).await?.ok_or_else(|| {
                NebulaError::not_found("signing CA", format!("{:?}", CertVersion::V2))
            })?;

            let single_ip = vec![ip_with_cidr.clone()];
            let (v1_pem, v1_fingerprint) = self
                .sign_one(&v1_ca, &request.node.name, &single_ip, duration_hours, &request.public_key_pem, groups_csv.as_deref())
                .await?;
            let (v2_pem, v2_fingerprint) = self
                .sign_one(&v2_ca, &request.node.name, &single_ip, duration_hours, &request.public_key_pem, groups_csv.as_deref())
                .await?;

            let mut combined = v1_pem;
            combined.push_str(&v2_pem);
            (combined, v2_ca.id, v2_fingerprint.or(v1_fingerprint))
        } else {
            let signing_ca =
                self.ca_repo.active_signing(request.cert_version).await?.ok_or_else(|| {
                    NebulaError::not_found("signing CA", format!("{:?}", request.cert_version))
                })?;
            let (pem, fingerprint) = self
                .sign_one(
                    &signing_ca,
                    &request.node.name,
                    &request.all_ips,
                    duration_hours,
                    &request.public_key_pem,
                    groups_csv.as_deref(),
                )
                .await?;
            (pem, signing_ca.id, fingerprint)
        };

        let not_before = now;
        let not_after = now + Duration::hours(duration_hours);

        let cert = HostCert {
            id: HostCertId::new(),
            node_id: request.node.id,
            cert_pem,
            not_before,
            not_after,
            fingerprint,
            issued_for_ip_cidr: ip_with_cidr,
            issued_for_groups_hash: groups_hash,
            issued_by_ca_id: signing_ca_id,
            cert_version: request.cert_version,
            revoked: false,
            revoked_at: None,
            created_at: now,
        };
        self.host_cert_repo.create(cert.clone()).await?;
        Ok(cert)
    }

    /// Signs one certificate against one CA: materializes `ca.crt`/`ca.key`
    /// and the host public key into a fresh scratch directory, invokes
    /// `nebula-cert sign`, and best-effort extracts the fingerprint.
    #[allow(clippy::too_many_arguments)]
    async fn sign_one(
        &self,
        ca: &Ca,
        node_name: &str,
        ips: &[String],
        duration_hours: i64,
        public_key_pem: &str,
        groups_csv: Option<&str>,
    ) -> Result<(String, Option<String>)> {
        let scratch = TempDir::new().map_err(NebulaError::from)?;
        let ca_crt_path = scratch.path().join("ca.crt");
        let ca_key_path = scratch.path().join("ca.key");
        let in_pub_path = scratch.path().join("host.pub");
        let out_crt_path = scratch.path().join("host.crt");

        tokio::fs::write(&ca_crt_path, &ca.cert_pem).await.map_err(NebulaError::from)?;
        let key_pem = ca
            .key_pem
            .as_ref()
            .ok_or_else(|| NebulaError::conflict("signing CA has no private key material"))?;
        tokio::fs::write(&ca_key_path, key_pem).await.map_err(NebulaError::from)?;
        tokio::fs::write(&in_pub_path, public_key_pem).await.map_err(NebulaError::from)?;

        self.cli
            .sign(
                scratch.path(),
                node_name,
                ips,
                duration_hours,
                &ca_crt_path,
                &ca_key_path,
                &in_pub_path,
                &out_crt_path,
                groups_csv,
            )
            .await?;

        let cert_pem = read_pem(scratch.path(), "host.crt").await?;
        let fingerprint = self.fingerprint_best_effort(scratch.path(), &out_crt_path).await;
        Ok((cert_pem, fingerprint))
    }

    /// `nebula-cert print -json` best-effort fingerprint extraction; a
    /// failure here must not fail issuance (spec §4.1, step 6).
    async fn fingerprint_best_effort(&self, cwd: &Path, cert_path: &Path) -> Option<String> {
        match self.cli.print_json(cwd, cert_path).await {
            Ok(info) => info.fingerprint,
            Err(err) => {
                warn!(error = %err, "nebula-cert print -json failed; issuing without a fingerprint");
                None
            }
        }
    }

    /// Revoke a host certificate. Terminal; revocation, not deletion, is the
    /// retirement path.
    pub async fn revoke_host_cert(&self, id: HostCertId) -> Result<()> {
        self.host_cert_repo.revoke(id).await
    }

    /// Fingerprints of every revoked-but-still-validity-windowed cert, the
    /// blocklist distributed to every node.
    pub async fn active_revoked_fingerprints(&self) -> Result<Vec<String>> {
        self.host_cert_repo.active_revoked_fingerprints().await
    }
}

async fn read_pem(dir: &Path, filename: &str) -> Result<String> {
    tokio::fs::read_to_string(dir.join(filename)).await.map_err(NebulaError::from)
}

/// The reuse precondition from spec §4.1 step 3, minus the "issuing CA still
/// signs" check (that needs a repository lookup the caller already has).
fn is_reusable(
    existing: &HostCert,
    ip_with_cidr: &str,
    groups_hash: &str,
    cert_version: CertVersion,
    now: DateTime<Utc>,
    reuse_threshold: Duration,
) -> bool {
    existing.has_headroom(now, reuse_threshold)
        && existing.issued_for_ip_cidr == ip_with_cidr
        && existing.issued_for_groups_hash == groups_hash
        && existing.cert_version == cert_version
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cert(not_after: DateTime<Utc>) -> HostCert {
        let now = Utc::now();
        HostCert {
            id: HostCertId::new(),
            node_id: nebula_core::NodeId::new(),
            cert_pem: String::new(),
            not_before: now,
            not_after,
            fingerprint: None,
            issued_for_ip_cidr: "10.0.0.1/16".into(),
            issued_for_groups_hash: "hash".into(),
            issued_by_ca_id: CaId::new(),
            cert_version: CertVersion::V1,
            revoked: false,
            revoked_at: None,
            created_at: now,
        }
    }

    #[test]
    fn identical_cidr_groups_and_version_within_headroom_reuses() {
        let now = Utc::now();
        let cert = sample_cert(now + Duration::days(30));
        assert!(is_reusable(&cert, "10.0.0.1/16", "hash", CertVersion::V1, now, Duration::days(7)));
    }

    #[test]
    fn expiring_soon_forces_reissue() {
        let now = Utc::now();
        let cert = sample_cert(now + Duration::days(3));
        assert!(!is_reusable(&cert, "10.0.0.1/16", "hash", CertVersion::V1, now, Duration::days(7)));
    }

    #[test]
    fn changed_groups_hash_forces_reissue() {
        let now = Utc::now();
        let cert = sample_cert(now + Duration::days(30));
        assert!(!is_reusable(&cert, "10.0.0.1/16", "different", CertVersion::V1, now, Duration::days(7)));
    }

    #[test]
    fn changed_ip_cidr_forces_reissue() {
        let now = Utc::now();
        let cert = sample_cert(now + Duration::days(30));
        assert!(!is_reusable(&cert, "10.0.0.2/16", "hash", CertVersion::V1, now, Duration::days(7)));
    }

    #[test]
    fn cert_version_upgrade_forces_reissue() {
        let now = Utc::now();
        let cert = sample_cert(now + Duration::days(30));
        assert!(!is_reusable(&cert, "10.0.0.1/16", "hash", CertVersion::V2, now, Duration::days(7)));
    }

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = CertManagerConfig::default();
        assert_eq!(config.reuse_threshold_days, 7);
        assert_eq!(config.ca_rotate_at_days, 182);
    }
}
