//! Cert-version negotiation (spec §4.3 step 4) and CA-bundle filtering
//! (step 5). The most subtle decision in the system: a node's declared
//! Nebula version and IP topology can both force the outcome away from
//! `GlobalSettings.cert_version`, and the two forces can conflict.

use nebula_core::{Ca, CertVersion, IpVersion};
use nebula_error::{NebulaError, Result};

/// `supports_v2 = parseNebulaVersion(node.nebulaVersion) >= (1, 10, 0)`.
/// An unparseable or absent version means "legacy": `false`.
#[must_use]
pub fn supports_v2(nebula_version: Option<&semver::Version>) -> bool {
    nebula_version.is_some_and(|v| *v >= semver::Version::new(1, 10, 0))
}

/// Resolves the cert format to issue for this fetch.
///
/// # Errors
/// `ErrorKind::Validation` (`IncompatibleClient`) if the node's IP topology
/// requires v2 certs but its reported Nebula version can't parse them.
pub fn negotiate_cert_version(
    global_cert_version: CertVersion,
    ip_version: IpVersion,
    nebula_version: Option<&semver::Version>,
) -> Result<CertVersion> {
    let supports_v2 = supports_v2(nebula_version);
    let requires_v2 = ip_version.requires_v2();

    if requires_v2 && !supports_v2 {
        return Err(NebulaError::validation(
            "node's IP topology requires v2 certificates but its Nebula version does not support them",
        ));
    }
    if requires_v2 {
        return Ok(CertVersion::V2);
    }
    if !supports_v2 {
        return Ok(match global_cert_version {
            CertVersion::V2 | CertVersion::Hybrid => CertVersion::V1,
            CertVersion::V1 => CertVersion::V1,
        });
    }
    Ok(global_cert_version)
}

/// Strips v2 CAs from the bundle for a client that can't parse them.
///
/// # Errors
/// `ErrorKind::NotFound` (`NoCompatibleCA`) if filtering empties the bundle.
pub fn filter_ca_bundle(cas: Vec<Ca>, supports_v2: bool) -> Result<Vec<Ca>> {
    let filtered = if supports_v2 {
        cas
    } else {
        cas.into_iter().filter(|ca| ca.cert_version != CertVersion::V2).collect::<Vec<_>>()
    };
    if filtered.is_empty() {
        return Err(NebulaError::not_found("compatible CA bundle", "none"));
    }
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u64, minor: u64) -> semver::Version {
        semver::Version::new(major, minor, 0)
    }

    #[test]
    fn unknown_version_is_treated_as_legacy() {
        assert!(!supports_v2(None));
    }

    #[test]
    fn version_at_the_threshold_supports_v2() {
        assert!(supports_v2(Some(&v(1, 10))));
        assert!(!supports_v2(Some(&v(1, 9))));
    }

    #[test]
    fn legacy_client_downgrades_hybrid_to_v1() {
        let result =
            negotiate_cert_version(CertVersion::Hybrid, IpVersion::Ipv4Only, Some(&v(1, 9)))
                .unwrap();
        assert_eq!(result, CertVersion::V1);
    }

    #[test]
    fn multi_ip_topology_on_a_legacy_client_is_incompatible() {
        let err =
            negotiate_cert_version(CertVersion::V1, IpVersion::MultiIpv4, Some(&v(1, 9)))
                .unwrap_err();
        assert_eq!(err.kind(), nebula_error::ErrorKind::Validation);
    }

    #[test]
    fn multi_ip_topology_forces_v2_even_under_a_v1_global_setting() {
        let result =
            negotiate_cert_version(CertVersion::V1, IpVersion::DualStack, Some(&v(1, 10)))
                .unwrap();
        assert_eq!(result, CertVersion::V2);
    }

    #[test]
    fn unsupported_v2_client_with_ipv4_only_stays_v1() {
        let result = negotiate_cert_version(CertVersion::V2, IpVersion::Ipv4Only, None).unwrap();
        assert_eq!(result, CertVersion::V1);
    }

    fn sample_ca(cert_version: CertVersion) -> Ca {
        let now = chrono::Utc::now();
        Ca {
            id: nebula_core::CaId::new(),
            name: "ca".into(),
            cert_pem: String::new(),
            key_pem: None,
            not_before: now,
            not_after: now + chrono::Duration::days(1),
            is_active: true,
            is_previous: false,
            can_sign: false,
            include_in_config: true,
            cert_version,
            nebula_version: None,
            created_at: now,
        }
    }

    #[test]
    fn filtering_for_a_legacy_client_strips_v2_cas() {
        let cas = vec![sample_ca(CertVersion::V1), sample_ca(CertVersion::V2)];
        let filtered = filter_ca_bundle(cas, false).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].cert_version, CertVersion::V1);
    }

    #[test]
    fn filtering_out_every_ca_is_a_prerequisite_failure() {
        let cas = vec![sample_ca(CertVersion::V2)];
        let err = filter_ca_bundle(cas, false).unwrap_err();
        assert_eq!(err.kind(), nebula_error::ErrorKind::NotFound);
    }
}
