//! HMAC-SHA-256 verification of the raw webhook body (spec §4.4).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// GitHub signs the raw request body with `sha256=<hex digest>`.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify `header_value` (the `X-Hub-Signature-256`-style header) against
/// an HMAC-SHA-256 of `body` keyed by `secret`, in constant time.
#[must_use]
pub fn verify(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(hex_digest) = header_value.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected_bytes) = hex::decode(hex_digest) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    computed.as_slice().ct_eq(&expected_bytes).into()
}

#[cfg(test)]
mod tests {
    use hmac::Mac;

    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn matching_signature_verifies() {
        let body = br#"{"token":"abc"}"#;
        let header = sign("s3cr3t", body);
        assert!(verify("s3cr3t", body, &header));
    }

    #[test]
    fn wrong_secret_fails() {
        let body = br#"{"token":"abc"}"#;
        let header = sign("s3cr3t", body);
        assert!(!verify("other", body, &header));
    }

    #[test]
    fn tampered_body_fails() {
        let body = br#"{"token":"abc"}"#;
        let header = sign("s3cr3t", body);
        assert!(!verify("s3cr3t", br#"{"token":"xyz"}"#, &header));
    }

    #[test]
    fn missing_prefix_fails() {
        assert!(!verify("s3cr3t", b"body", "deadbeef"));
    }

    #[test]
    fn malformed_hex_fails() {
        assert!(!verify("s3cr3t", b"body", "sha256=not-hex"));
    }
}
