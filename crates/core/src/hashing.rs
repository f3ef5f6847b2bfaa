//! Shared SHA-256 hex digest utility.
//!
//! Backs client-secret hashing, idempotency lookup keys and the body-hash
//! fallback for inbound event ids.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_lowercase_hex_of_fixed_width() {
        let digest = sha256_hex(br#"{"type":"signing.completed"}"#);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn different_bodies_produce_different_digests() {
        assert_ne!(sha256_hex(b"{\"id\":1}"), sha256_hex(b"{\"id\":2}"));
    }
}
