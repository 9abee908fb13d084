//! Content fingerprinting.
//!
//! Every ingested document is identified by the SHA-256 of its raw bytes.
//! The pair `bookId:contentHash` forms the idempotency key that guards the
//! indexing pipeline against duplicate deliveries.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 of `content` as a 64-character lowercase hex string.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Short fingerprint for log lines: the first 16 hex characters of the full hash.
pub fn quick_hash(content: &[u8]) -> String {
    let mut full = sha256_hex(content);
    full.truncate(16);
    full
}

/// Idempotency key for a `(bookId, contentHash)` pair.
pub fn idempotency_key(book_id: u32, content_hash: &str) -> String {
    format!("{}:{}", book_id, content_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = sha256_hex(b"hello world");
        let b = sha256_hex(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_matches_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(sha256_hex(b"hello"), sha256_hex(b"hello "));
    }

    #[test]
    fn quick_hash_is_prefix_of_full() {
        let full = sha256_hex(b"some book text");
        let quick = quick_hash(b"some book text");
        assert_eq!(quick.len(), 16);
        assert!(full.starts_with(&quick));
    }

    #[test]
    fn idempotency_key_format() {
        let key = idempotency_key(42, "abc123");
        assert_eq!(key, "42:abc123");
    }

    #[test]
    fn idempotency_key_unique_per_pair() {
        let hash_a = sha256_hex(b"version one");
        let hash_b = sha256_hex(b"version two");
        assert_ne!(idempotency_key(1, &hash_a), idempotency_key(2, &hash_a));
        assert_ne!(idempotency_key(1, &hash_a), idempotency_key(1, &hash_b));
    }
}
