//! Outbound payload signing.
//!
//! Listeners that register a secret receive every payload with an
//! `X-Webpa-Signature: sha1=<hex>` header carrying the HMAC-SHA1 of the
//! body. The verification half exists for receivers and tests.

use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Header name carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "X-Webpa-Signature";

/// Computes the `sha1=<hex>` signature header value for a payload.
pub fn signature_header(secret: &[u8], payload: &[u8]) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(payload);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a `sha1=<hex>` header value against a payload.
///
/// Comparison is constant time to avoid leaking the expected signature.
pub fn verify_signature(secret: &[u8], payload: &[u8], header: &str) -> bool {
    let expected = signature_header(secret, payload);
    timing_safe_eq(header, &expected)
}

fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.as_bytes().iter().zip(b.as_bytes()) {
        result |= a_byte ^ b_byte;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_has_sha1_prefix_and_hex_digest() {
        let header = signature_header(b"123456", b"Hello, world.");

        let hex_part = header.strip_prefix("sha1=").unwrap();
        assert_eq!(hex_part.len(), 40);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signing_is_deterministic() {
        let first = signature_header(b"secret", b"payload");
        let second = signature_header(b"secret", b"payload");
        assert_eq!(first, second);
    }

    #[test]
    fn verify_round_trip() {
        let header = signature_header(b"secret", b"payload");
        assert!(verify_signature(b"secret", b"payload", &header));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let header = signature_header(b"secret", b"payload");
        assert!(!verify_signature(b"secret", b"payload2", &header));
        assert!(!verify_signature(b"other", b"payload", &header));
    }

    #[test]
    fn timing_safe_eq_handles_length_mismatch() {
        assert!(!timing_safe_eq("sha1=abc", "sha1=abcd"));
        assert!(timing_safe_eq("sha1=abc", "sha1=abc"));
    }
}
