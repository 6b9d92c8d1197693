//! Canonical serialization for deterministic fingerprints.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable collection order: hashed types use `BTreeSet`/`BTreeMap`, never `HashMap`
//! - Payload maps are `BTreeMap`, so payload documents hash stably too

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// serde_json only fails on maps with non-string keys; no hashed type in
/// this crate has one, so the empty fallback is unreachable in practice.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;
    use serde_json::json;

    #[test]
    fn test_determinism() {
        let payload = Payload::from(json!({"type": "database", "port": 5432}));
        assert_eq!(canonical_hash(&payload), canonical_hash(&payload.clone()));
    }

    #[test]
    fn test_payload_key_order_irrelevant() {
        let a = Payload::from(json!({"a": 1, "b": 2}));
        let b = Payload::from(json!({"b": 2, "a": 1}));
        assert_eq!(canonical_hash_hex(&a), canonical_hash_hex(&b));
    }

    #[test]
    fn test_hex_width() {
        assert_eq!(canonical_hash_hex(&"x").len(), 16);
    }
}
