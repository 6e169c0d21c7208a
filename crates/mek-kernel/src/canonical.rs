//! Canonical serialization and hashing.
//!
//! Evidence verification depends on every primitive hashing the same way on
//! every machine, so there is exactly one serializer and everything
//! delegates to it. The canonical form is compact JSON with:
//!
//! - struct fields in declaration order (the declared order *is* the
//!   canonical order),
//! - map keys in sorted order (`BTreeMap`-backed maps throughout),
//! - integers in decimal, timestamps as monotonic tick integers,
//! - booleans as `true`/`false`, null as `null`,
//! - floating-point values in shortest round-trip decimal form,
//! - no insignificant whitespace.
//!
//! The hash algorithm is SHA-256, hex-encoded lowercase. Nothing in the
//! kernel hashes through any other path.

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Width of a SHA-256 digest in bytes.
pub const DIGEST_SIZE: usize = 32;

/// A raw SHA-256 digest.
pub type Digest256 = [u8; DIGEST_SIZE];

/// Errors produced by canonical serialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalError {
    /// The value could not be serialized to canonical JSON.
    #[error("canonical serialization failed: {message}")]
    Serialize {
        /// Description of the underlying serializer error.
        message: String,
    },
}

/// Serialize a value to its canonical JSON form.
///
/// # Errors
///
/// Returns [`CanonicalError::Serialize`] if the value cannot be represented
/// in canonical JSON (for example a map with non-string keys).
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    serde_json::to_string(value).map_err(|e| CanonicalError::Serialize {
        message: e.to_string(),
    })
}

/// SHA-256 over raw bytes.
#[must_use]
pub fn sha256(bytes: &[u8]) -> Digest256 {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// SHA-256 over raw bytes, hex-encoded lowercase.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

/// Canonical hash of a serializable value: SHA-256 of its canonical JSON,
/// hex-encoded lowercase.
///
/// # Errors
///
/// Returns [`CanonicalError::Serialize`] if canonical serialization fails.
pub fn hash_canonical<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    Ok(sha256_hex(to_canonical_json(value)?.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::Value;

    use super::*;

    #[test]
    fn map_keys_are_sorted() {
        let mut fields: BTreeMap<String, Value> = BTreeMap::new();
        fields.insert("zebra".to_string(), Value::from(1));
        fields.insert("alpha".to_string(), Value::from(2));
        let json = to_canonical_json(&fields).expect("canonical");
        assert_eq!(json, r#"{"alpha":2,"zebra":1}"#);
    }

    #[test]
    fn hash_is_stable_across_insertion_order() {
        let mut a: BTreeMap<String, Value> = BTreeMap::new();
        a.insert("x".to_string(), Value::from("1"));
        a.insert("y".to_string(), Value::from("2"));
        let mut b: BTreeMap<String, Value> = BTreeMap::new();
        b.insert("y".to_string(), Value::from("2"));
        b.insert("x".to_string(), Value::from("1"));
        assert_eq!(
            hash_canonical(&a).expect("hash"),
            hash_canonical(&b).expect("hash")
        );
    }

    #[test]
    fn floats_use_shortest_round_trip_form() {
        let json = to_canonical_json(&0.9_f64).expect("canonical");
        assert_eq!(json, "0.9");
    }

    #[test]
    fn known_digest() {
        // SHA-256 of the empty string is a fixed vector.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn single_byte_difference_changes_hash() {
        assert_ne!(sha256_hex(b"bundle-a"), sha256_hex(b"bundle-b"));
    }
}
