// hasher.rs: SHA-256 hashing utilities.
//
// All digests in Covenant are SHA-256, hex-encoded: objective hashes,
// action hashes, and ledger chain links.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const HEX_DIGEST_LEN: usize = 64;

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash several byte slices as if they were concatenated.
///
/// Used for chain links, where the running hash and the canonical entry
/// are fed in sequence without building an intermediate buffer.
pub fn hash_concat(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_determinism() {
        let input = b"send weekly summary to alice";
        assert_eq!(hash_bytes(input), hash_bytes(input));
    }

    #[test]
    fn hash_is_hex_encoded_sha256() {
        let hash = hash_str("test");
        assert_eq!(hash.len(), HEX_DIGEST_LEN);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn hash_known_value() {
        // SHA-256("") = e3b0c442...
        assert_eq!(
            hash_str(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn concat_matches_single_buffer() {
        let joined = hash_bytes(b"abcdef");
        assert_eq!(hash_concat(&[b"abc", b"def"]), joined);
        assert_eq!(hash_concat(&[b"", b"abcdef"]), joined);
    }
}
