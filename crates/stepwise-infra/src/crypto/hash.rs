//! SHA-256 content hashing for template step graphs.
//!
//! Implements the `ContentHasher` trait from `stepwise-core` using the
//! `sha2` crate (RustCrypto ecosystem).

use sha2::{Digest, Sha256};

use stepwise_core::service::hash::ContentHasher;

/// SHA-256 implementation of `ContentHasher`.
///
/// Computes lowercase hex-encoded digests. Workflows pin the digest of their
/// template's canonical step JSON and re-check it on every load.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256ContentHasher;

impl ContentHasher for Sha256ContentHasher {
    fn compute_hash(&self, content: &str) -> String {
        format!("{:x}", Sha256::digest(content.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hash_known_value() {
        // SHA-256 of empty string
        assert_eq!(
            Sha256ContentHasher.compute_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_step_json_hash_is_stable() {
        let steps = r#"[{"id":"step1","title":"Collect"},{"id":"step2","title":"Review","depends_on":["step1"]}]"#;
        let first = Sha256ContentHasher.compute_hash(steps);
        assert_eq!(first, Sha256ContentHasher.compute_hash(steps));
        assert_ne!(first, Sha256ContentHasher.compute_hash(&steps.replace("Review", "Approve")));
    }

    #[test]
    fn test_sha256_hash_is_lowercase_hex() {
        let hash = Sha256ContentHasher.compute_hash("test");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
