// hasher.rs — SHA-256 hashing utilities.
//
// All hashes in the journal are SHA-256, hex-encoded as 64 lowercase
// characters.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash the compact JSON serialization of a value.
///
/// Struct fields serialize in declaration order and maps are BTreeMaps, so
/// the same value always yields the same bytes.
pub fn hash_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hash_bytes(&bytes))
}
