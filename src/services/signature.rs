//! Webhook signature verification
//!
//! AfterShip signs webhook deliveries with HMAC-SHA256 over the exact raw
//! request bytes, base64-encoded in the `Aftership-Hmac-Sha256` header.
//! Verification must run against the bytes as received; re-serializing the
//! body changes the digest.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the base64 HMAC-SHA256 signature for a payload.
pub fn hmac_sha256_base64(payload: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Verify a provided signature against the raw request bytes.
///
/// Returns `false` for any malformed input (bad base64, wrong length); it
/// never panics or errors. Comparison is constant-time via `Mac::verify_slice`.
pub fn verify(payload: &[u8], provided: &str, secret: &str) -> bool {
    let Ok(signature) = STANDARD.decode(provided) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_signature_verifies() {
        let body = br#"{"event":"tracking_update","ts":1}"#;
        let sig = hmac_sha256_base64(body, "topsecret");
        assert!(verify(body, &sig, "topsecret"));
    }

    #[test]
    fn test_mutated_body_rejected() {
        let body = b"payload-bytes";
        let sig = hmac_sha256_base64(body, "k");
        // Flip one byte
        let mut mutated = body.to_vec();
        mutated[0] ^= 0x01;
        assert!(!verify(&mutated, &sig, "k"));
    }

    #[test]
    fn test_mutated_signature_rejected() {
        let body = b"payload-bytes";
        let sig = hmac_sha256_base64(body, "k");
        let mut chars: Vec<char> = sig.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let mutated: String = chars.into_iter().collect();
        assert!(!verify(body, &mutated, "k"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload-bytes";
        let sig = hmac_sha256_base64(body, "k1");
        assert!(!verify(body, &sig, "k2"));
    }

    #[test]
    fn test_malformed_base64_rejected() {
        assert!(!verify(b"body", "not base64 at all!!!", "k"));
        assert!(!verify(b"body", "", "k"));
    }

    #[test]
    fn test_known_vector() {
        // Spot-check against an independently computed value:
        // echo -n "hello" | openssl dgst -sha256 -hmac "secret" -binary | base64
        let sig = hmac_sha256_base64(b"hello", "secret");
        assert_eq!(sig, "iKqz7ejTrflNJquQ07r9SiCDBww7zOnAFO4EpEOEfAs=");
    }
}
