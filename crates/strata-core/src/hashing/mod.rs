//! Canonical JSON normalization and SHA-256 digests.
//!
//! Every integrity claim in the core (audit entry hashes, snapshot content
//! hashes, Merkle roots) goes through this module. The encoding must be
//! reproducible bit-for-bit by any other implementation:
//! - object keys sorted recursively by UTF-16 code units
//! - integer-valued floats written as integers; NaN/Infinity rejected
//! - compact output (no whitespace), arrays keep their order
//! - SHA-256, lowercase hex

mod merkle;

pub use merkle::merkle_root;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of the empty string.
pub const EMPTY_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Errors produced while canonicalizing or hashing.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("NaN/Infinity not permitted in canonical JSON")]
    NonFiniteNumber,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type HashResult<T> = std::result::Result<T, HashError>;

/// Integer-valued floats become integers; non-finite numbers are rejected.
fn normalize_value(value: &serde_json::Value) -> HashResult<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut normalized = serde_json::Map::new();
            for (k, v) in map.iter() {
                normalized.insert(k.clone(), normalize_value(v)?);
            }
            Ok(serde_json::Value::Object(normalized))
        }
        serde_json::Value::Array(arr) => Ok(serde_json::Value::Array(
            arr.iter().map(normalize_value).collect::<HashResult<Vec<_>>>()?,
        )),
        serde_json::Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return Ok(serde_json::Value::Number(n.clone()));
            }
            match n.as_f64() {
                Some(f) if !f.is_finite() => Err(HashError::NonFiniteNumber),
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(serde_json::Value::Number(serde_json::Number::from(f as i64)))
                }
                _ => Ok(serde_json::Value::Number(n.clone())),
            }
        }
        other => Ok(other.clone()),
    }
}

/// Convert a JSON value to canonical form: normalize numbers, sort keys, compact.
pub fn canonical_json(value: &serde_json::Value) -> HashResult<String> {
    let normalized = normalize_value(value)?;
    let mut out = String::new();
    write_canonical(&normalized, &mut out)?;
    Ok(out)
}

// `serde_json::Map` orders keys by UTF-8 bytes (or by insertion with
// `preserve_order`), so the text is emitted here with an explicit UTF-16 sort.

fn write_canonical(value: &serde_json::Value, out: &mut String) -> HashResult<()> {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out)?;
                }
            }
            out.push('}');
        }
        serde_json::Value::Array(arr) => {
            out.push('[');
            for (i, v) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// SHA-256 hex digest of raw bytes.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of a UTF-8 string.
pub fn hash_str(data: &str) -> String {
    hash_bytes(data.as_bytes())
}

/// SHA-256 hex digest of the canonical JSON of `value`.
pub fn compute_digest(value: &serde_json::Value) -> HashResult<String> {
    Ok(hash_str(&canonical_json(value)?))
}

/// Serialize `value` through serde and digest its canonical form.
pub fn digest_of<T: Serialize + ?Sized>(value: &T) -> HashResult<String> {
    compute_digest(&serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_hash_constant() {
        assert_eq!(hash_str(""), EMPTY_HASH);
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let input = json!({ "b": { "z": 1, "a": 2 }, "a": [3, 1] });
        assert_eq!(canonical_json(&input).unwrap(), r#"{"a":[3,1],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn test_canonical_json_utf16_ordering() {
        // U+FF61 sorts before U+1F600 in UTF-8 byte order but after it in UTF-16.
        let input = json!({ "\u{1F600}": 1, "\u{FF61}": 2 });
        let canonical = canonical_json(&input).unwrap();
        assert_eq!(canonical, "{\"\u{1F600}\":1,\"\u{FF61}\":2}");
    }

    #[test]
    fn test_canonical_json_integer_float() {
        assert_eq!(canonical_json(&json!({ "value": 1.0 })).unwrap(), r#"{"value":1}"#);
        assert_eq!(canonical_json(&json!({ "value": -1.0 })).unwrap(), r#"{"value":-1}"#);
        assert_eq!(canonical_json(&json!({ "value": 1.5 })).unwrap(), r#"{"value":1.5}"#);
    }

    #[test]
    fn test_canonical_json_field_order_invariant() {
        let a = json!({ "a": 1, "b": 2, "c": { "x": null, "y": true } });
        let b = json!({ "c": { "y": true, "x": null }, "b": 2, "a": 1 });
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
        assert_eq!(compute_digest(&a).unwrap(), compute_digest(&b).unwrap());
    }

    #[test]
    fn test_canonical_json_array_order_preserved() {
        let a = json!([1, 2, 3]);
        let b = json!([3, 2, 1]);
        assert_ne!(compute_digest(&a).unwrap(), compute_digest(&b).unwrap());
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let input = json!({ "q": "say \"hi\"\n" });
        assert_eq!(canonical_json(&input).unwrap(), r#"{"q":"say \"hi\"\n"}"#);
    }

    #[test]
    fn test_compute_digest_is_sha256_of_canonical_text() {
        let input = json!({ "name": "A" });
        assert_eq!(compute_digest(&input).unwrap(), hash_str(r#"{"name":"A"}"#));
        assert_eq!(compute_digest(&input).unwrap().len(), 64);
    }

    #[test]
    fn test_digest_of_struct_matches_value_digest() {
        #[derive(Serialize)]
        struct Probe {
            z: u8,
            a: &'static str,
        }
        let via_struct = digest_of(&Probe { z: 1, a: "x" }).unwrap();
        let via_value = compute_digest(&json!({ "a": "x", "z": 1 })).unwrap();
        assert_eq!(via_struct, via_value);
    }
}
