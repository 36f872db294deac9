//! Issuance-fingerprint computation.
//!
//! `CertManager::issue_or_rotate` decides reuse vs. re-signing from the tuple
//! `(issued_for_ip_cidr, issued_for_groups_hash, cert_version,
//! issued_by_ca_id)`. This is unrelated to [`nebula_core::HostCert::fingerprint`],
//! the content-hash `nebula-cert print -json` reports for the revocation
//! blocklist.

use sha2::{Digest, Sha256};

/// `SHA-256(sorted(group_names).join(","))`, hex-encoded.
///
/// Any rename or membership change that alters this hash forces a new host
/// cert on the node's next config fetch.
#[must_use]
pub fn groups_hash(group_names: &[String]) -> String {
    let mut sorted: Vec<&str> = group_names.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let joined = sorted.join(",");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_does_not_affect_the_hash() {
        let a = groups_hash(&["web".to_string(), "db".to_string()]);
        let b = groups_hash(&["db".to_string(), "web".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_membership_changes_the_hash() {
        let a = groups_hash(&["web".to_string()]);
        let b = groups_hash(&["web".to_string(), "db".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_groups_hash_is_stable() {
        assert_eq!(groups_hash(&[]), groups_hash(&[]));
    }
}
