// crates/tracehub-core/src/hashing.rs
// ============================================================================
// Module: TraceHub Hashing
// Description: Content-addressed hashing for judge-cache keys and API keys.
// Purpose: Produce a deterministic hex digest from any serializable value by
//          canonicalizing it to JSON first, so field order never affects the
//          resulting hash.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

/// Canonicalizes `value` to JCS-canonical JSON and returns its hex sha-256
/// digest.
///
/// Used for `JudgeCache.input_hash` (a stable hash of trace id, input/output
/// text, request/response payloads, and the evaluation snapshot) and for
/// `Project.api_key_hash` (a hash of the plaintext API key).
///
/// # Errors
/// Returns an error if `value` cannot be serialized to JSON, which only
/// happens for types with a failing custom `Serialize` impl.
pub fn stable_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_value(value)?;
    let canonical = serde_jcs::to_string(&json).map_err(serde::ser::Error::custom)?;
    Ok(hex_sha256(canonical.as_bytes()))
}

/// Returns the hex sha-256 digest of raw bytes, used for API key hashing
/// where the input is already a plain string rather than a structured value.
#[must_use]
pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::hex_sha256;
    use super::stable_hash;
    use serde_json::json;

    #[test]
    fn stable_hash_ignores_field_order() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(stable_hash(&a).unwrap(), stable_hash(&b).unwrap());
    }

    #[test]
    fn hex_sha256_is_deterministic() {
        assert_eq!(hex_sha256(b"dev-key"), hex_sha256(b"dev-key"));
        assert_ne!(hex_sha256(b"dev-key"), hex_sha256(b"other-key"));
    }
}
