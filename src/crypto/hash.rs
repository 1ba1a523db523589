//! Deterministic hashing for content-addressed proof caching
//!
//! - RFC 8785 JSON Canonicalization Scheme (JCS) for input hashing
//! - Domain separation prefixes for derived references
//! - Reproducible hashes across processes and store backends

use sha2::{Digest, Sha256};

use crate::domain::Hash256;

/// Domain prefix for hashing a proof payload into an audit root.
pub const DOMAIN_PROOF_ROOT: &[u8] = b"ZKVOTE_PROOF_ROOT_V1";

/// Domain prefix for deriving a cross-chain relay reference from a
/// finalized block hash.
pub const DOMAIN_RELAY_REF: &[u8] = b"ZKVOTE_RELAY_REF_V1";

/// Convert a JSON value to its canonical string representation per
/// RFC 8785 (JCS): keys sorted lexicographically, no whitespace, ES6
/// number normalization.
///
/// # Panics
///
/// Panics if the value contains a float that cannot be represented
/// (NaN or Infinity). Per RFC 8785, these are not valid JSON.
pub fn canonicalize_json(value: &serde_json::Value) -> String {
    serde_json_canonicalizer::to_string(value)
        .expect("Failed to canonicalize JSON - contains invalid values (NaN or Infinity)")
}

/// Hash raw bytes with SHA-256 (no domain prefix)
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Content-addressed cache key for a proof request.
///
/// `fingerprint = SHA256(JCS(inputs) || circuit_hash)`
///
/// The circuit hash is appended as its hex ASCII form, so a circuit
/// version flip changes every fingerprint computed under it and stale
/// cache entries stop resolving without explicit eviction.
pub fn fingerprint(inputs: &serde_json::Value, circuit_hash: &str) -> Hash256 {
    let canonical = canonicalize_json(inputs);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(circuit_hash.as_bytes());
    hasher.finalize().into()
}

/// SHA-256 of the canonicalized inputs, recorded in the audit ledger.
pub fn input_hash(inputs: &serde_json::Value) -> Hash256 {
    sha256(canonicalize_json(inputs).as_bytes())
}

/// Hash of a proof payload for the audit ledger.
///
/// `proof_root = SHA256(b"ZKVOTE_PROOF_ROOT_V1" || JCS(payload))`
pub fn proof_root(payload: &serde_json::Value) -> Hash256 {
    let canonical = canonicalize_json(payload);

    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_PROOF_ROOT);
    hasher.update(canonical.as_bytes());
    hasher.finalize().into()
}

/// Derive a stable cross-chain relay reference from a finalized block hash.
///
/// `relay_ref = SHA256(b"ZKVOTE_RELAY_REF_V1" || block_hash_bytes)`
///
/// Deterministic and collision-resistant; the block hash is taken as hex
/// with or without a `0x` prefix.
pub fn relay_reference(block_hash: &str) -> Hash256 {
    let stripped = block_hash.strip_prefix("0x").unwrap_or(block_hash);
    let bytes = hex::decode(stripped).unwrap_or_else(|_| stripped.as_bytes().to_vec());

    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_RELAY_REF);
    hasher.update(&bytes);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys() {
        let value = json!({"zebra": 1, "apple": 2, "mango": 3});
        assert_eq!(canonicalize_json(&value), r#"{"apple":2,"mango":3,"zebra":1}"#);
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = json!({"country": "US", "dob": "1970-01-01", "residency": "CA"});
        let b = json!({"residency": "CA", "country": "US", "dob": "1970-01-01"});
        let h = "58973d361f4b6fa0c9d9f7d52d8cd6b5d5be54473a7fa80638a44eb2e0975bf2";

        assert_eq!(fingerprint(&a, h), fingerprint(&b, h));
    }

    #[test]
    fn fingerprint_depends_on_circuit_hash() {
        let inputs = json!({"country": "US"});

        let f1 = fingerprint(&inputs, "aa");
        let f2 = fingerprint(&inputs, "bb");
        assert_ne!(f1, f2);
    }

    #[test]
    fn proof_root_uses_domain_prefix() {
        let payload = json!("proof-1234");
        assert_ne!(proof_root(&payload), input_hash(&payload));
    }

    #[test]
    fn relay_reference_is_deterministic() {
        let h = "0x3a5b000000000000000000000000000000000000000000000000000000000001";
        assert_eq!(relay_reference(h), relay_reference(h));
        assert_ne!(
            relay_reference(h),
            relay_reference("0x3a5b000000000000000000000000000000000000000000000000000000000002")
        );
    }
}
