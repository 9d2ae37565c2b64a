//! Content hashing for cache keys.

use sha2::{Digest, Sha256};

/// SHA-256 of the exact source bytes, lower-case hex
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_single_byte_change_changes_key() {
        let a = sha256_hex(b"       MOVE A TO B.\n");
        let b = sha256_hex(b"       MOVE A TO C.\n");
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
