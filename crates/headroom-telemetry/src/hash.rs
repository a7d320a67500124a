//! Content hashing for the content-addressed store

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as 64 lowercase hex characters
pub fn content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// First 12 hex characters of the content hash, used in segment ids
pub fn short_hash(data: &[u8]) -> String {
    let mut hash = content_hash(data);
    hash.truncate(12);
    hash
}
