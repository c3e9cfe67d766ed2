//! Content addressing helpers.
//!
//! Digests are always `sha256:<64 lowercase hex>` computed over the exact
//! bytes that are pushed. Rewritten manifests are encoded through
//! [`canonical_json`] so that re-encoding the same document is reproducible.

use labelmod_core::error::{LabelModError, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Algorithm prefix of every digest this crate produces or accepts.
pub const SHA256_PREFIX: &str = "sha256:";

/// Compute the `sha256:<hex>` digest of raw bytes.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("{}{}", SHA256_PREFIX, hex::encode(Sha256::digest(data)))
}

/// Check `data` against an expected digest string.
pub fn verify_digest(data: &[u8], expected: &str) -> bool {
    sha256_digest(data) == expected
}

/// Validate a digest string: `sha256:` followed by 64 lowercase hex chars.
pub fn validate_digest(digest: &str) -> Result<()> {
    let hex_part = digest.strip_prefix(SHA256_PREFIX).ok_or_else(|| {
        LabelModError::InvalidReference(format!(
            "Unsupported digest '{}': expected sha256:<hex>",
            digest
        ))
    })?;

    if hex_part.len() != 64
        || !hex_part
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(LabelModError::InvalidReference(format!(
            "Invalid digest '{}': expected 64 lowercase hex characters",
            digest
        )));
    }
    Ok(())
}

/// Encode a JSON value compactly with object keys in lexicographic order.
///
/// The ordering does not depend on how `serde_json` was compiled (with or
/// without `preserve_order`), so the output is stable across builds.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&sorted(value))?)
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256_of_empty_input() {
        assert_eq!(
            sha256_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_verify_digest() {
        let digest = sha256_digest(b"hello");
        assert!(verify_digest(b"hello", &digest));
        assert!(!verify_digest(b"hello!", &digest));
    }

    #[test]
    fn test_validate_digest_accepts_sha256() {
        let digest = sha256_digest(b"config");
        assert!(validate_digest(&digest).is_ok());
    }

    #[test]
    fn test_validate_digest_rejects_other_algorithms() {
        let err = validate_digest("sha512:abcd").unwrap_err();
        assert!(matches!(err, LabelModError::InvalidReference(_)));
    }

    #[test]
    fn test_validate_digest_rejects_short_or_uppercase_hex() {
        assert!(validate_digest("sha256:abc123").is_err());
        let upper = format!("sha256:{}", "A".repeat(64));
        assert!(validate_digest(&upper).is_err());
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({
            "z": 1,
            "a": {"y": true, "b": [{"d": 1, "c": 2}]}
        });
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"b":[{"c":2,"d":1}],"y":true},"z":1}"#
        );
    }

    #[test]
    fn test_canonical_json_is_reproducible() {
        let value = json!({"config": {"Labels": {"b": "2", "a": "1"}}, "os": "linux"});
        let first = canonical_json(&value).unwrap();
        let reparsed: Value = serde_json::from_slice(&first).unwrap();
        assert_eq!(canonical_json(&reparsed).unwrap(), first);
    }
}
