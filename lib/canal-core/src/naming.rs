//! Stable names and content hashes

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Prefix of every derived service name
pub const DERIVED_NAME_PREFIX: &str = "derived-";

/// Hex digits of the digest kept in a derived name
const DERIVED_NAME_HASH_LEN: usize = 10;

/// Name of the derived service for `namespace/name`.
///
/// The result is a lowercase DNS label that only depends on its inputs, so
/// every cluster computes the same name for the same service.
pub fn derived_name(namespace: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b"/");
    hasher.update(name.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}{}", DERIVED_NAME_PREFIX, &digest[..DERIVED_NAME_HASH_LEN])
}

/// Content hash of a serializable value.
///
/// The value is first converted to a `serde_json::Value`, whose maps are
/// key-ordered, so two values with the same logical content hash the same
/// regardless of the iteration order of any maps they contain.
pub fn spec_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_value(value)?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
