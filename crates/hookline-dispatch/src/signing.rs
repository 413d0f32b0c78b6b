//! HMAC-SHA256 payload signing for consumer callbacks.
//!
//! Every callback carries a signature of the raw payload under the
//! consumer's token so receivers can verify both authenticity and
//! integrity before acting on a delivery.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature on every callback.
pub const SIGNATURE_HEADER: &str = "X-Hookline-Signature";

/// Signs `payload` with `secret`, returning the `sha256=<hex>` header
/// value.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a `sha256=<hex>` signature in constant time.
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        let signature = sign("consumer-token", b"some payload");
        assert_eq!(
            signature,
            "sha256=fb8bf52994977042b8b27ad353bfca7fd5caf9994aad380ec3c4e4d00de46a6e"
        );
    }

    #[test]
    fn sign_verify_roundtrip() {
        let signature = sign("consumer-token", b"some payload");
        assert!(verify("consumer-token", b"some payload", &signature));
        assert!(!verify("other-token", b"some payload", &signature));
        assert!(!verify("consumer-token", b"tampered payload", &signature));
    }

    #[test]
    fn malformed_signatures_rejected() {
        assert!(!verify("consumer-token", b"some payload", "not-a-signature"));
        assert!(!verify("consumer-token", b"some payload", "sha256=zz"));
        assert!(!verify("consumer-token", b"some payload", ""));
    }
}
