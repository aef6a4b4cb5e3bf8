//! SHA-256 primitives and the tagged-hash construction.
//!
//! All protocol digests are domain-separated through the tagged form
//! `SHA256(SHA256(tag) || SHA256(tag) || data)` so that a transaction hash
//! can never collide with a block hash or a Merkle node.

use sha2::{Digest, Sha256};

use crate::types::Hash256;

/// Tag for transaction hashes and Merkle leaves.
pub const TAG_TX: &str = "TX";
/// Tag for interior Merkle nodes.
pub const TAG_MERKLE: &str = "MERKLE";
/// Tag for block header hashes.
pub const TAG_BLOCK: &str = "BLOCK";
/// Tag for the unspendable genesis coinbase commitment.
pub const TAG_GENESIS: &str = "GENESIS";

/// One-shot SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Tagged hash: `SHA256(SHA256(tag) || SHA256(tag) || data)`.
pub fn tagged_hash(tag: &str, data: &[u8]) -> Hash256 {
    let tag_digest = sha256(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_digest);
    hasher.update(tag_digest);
    hasher.update(data);
    Hash256(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256d_is_double_application() {
        let data = b"stater";
        assert_eq!(sha256d(data), sha256(&sha256(data)));
    }

    #[test]
    fn tagged_hash_matches_manual_construction() {
        let data = b"payload";
        let tag_digest = sha256(TAG_TX.as_bytes());
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&tag_digest);
        preimage.extend_from_slice(&tag_digest);
        preimage.extend_from_slice(data);
        assert_eq!(tagged_hash(TAG_TX, data), Hash256(sha256(&preimage)));
    }

    #[test]
    fn tags_separate_domains() {
        let data = b"same bytes";
        assert_ne!(tagged_hash(TAG_TX, data), tagged_hash(TAG_BLOCK, data));
        assert_ne!(tagged_hash(TAG_TX, data), tagged_hash(TAG_MERKLE, data));
    }

    #[test]
    fn tagged_hash_of_empty_input_is_defined() {
        let h = tagged_hash(TAG_BLOCK, &[]);
        assert!(!h.is_zero());
    }
}
