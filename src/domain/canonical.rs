//! Canonical JSON form and SHA-256 fingerprinting.
//!
//! The writer is hand-rolled so the byte form is fully under our control:
//! object keys sorted lexicographically, arrays kept in input order, numbers
//! written in their minimal form, UTF-8 throughout. Two serializations of the
//! same value are byte-identical, which is what makes request hashes and
//! artifact hashes replayable across machines.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::errors::CanonicalError;

/// Serialize any value into its canonical JSON byte form.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let value = serde_json::to_value(value).map_err(|e| CanonicalError::NonFiniteNumber {
        path: format!("$ ({e})"),
    })?;
    let mut out = String::new();
    write_value(&mut out, &value, "$")?;
    Ok(out)
}

/// `"sha256:" + hex(SHA256(canonical(value)))`.
pub fn hash_canonical<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let canonical = canonical_json(value)?;
    Ok(format!("sha256:{}", sha256_hex(canonical.as_bytes())))
}

/// Artifact hash: canonical hash with volatile fields excluded.
///
/// `created_at` timestamps and the artifact's own embedded hash are stripped
/// at any depth before hashing, so repeated reads of the same artifact agree.
pub fn artifact_hash(artifact: &Value) -> Result<String, CanonicalError> {
    let mut stripped = artifact.clone();
    strip_volatile(&mut stripped);
    hash_canonical(&stripped)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

const VOLATILE_KEYS: [&str; 2] = ["created_at", "artifact_hash"];

fn strip_volatile(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|k, _| !VOLATILE_KEYS.contains(&k.as_str()));
            for v in map.values_mut() {
                strip_volatile(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                strip_volatile(v);
            }
        }
        _ => {}
    }
}

fn write_value(out: &mut String, value: &Value, path: &str) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(CanonicalError::NonFiniteNumber {
                        path: path.to_string(),
                    });
                }
            }
            // serde_json renders the shortest round-trip form, which is
            // already minimal and deterministic.
            out.push_str(&n.to_string());
        }
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item, &format!("{path}[{i}]"))?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[*key], &format!("{path}.{key}"))?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_lexicographically() {
        let v = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"a":2,"b":1,"c":{"y":2,"z":1}}"#
        );
    }

    #[test]
    fn test_arrays_keep_input_order() {
        let v = json!({"xs": [3, 1, 2]});
        assert_eq!(canonical_json(&v).unwrap(), r#"{"xs":[3,1,2]}"#);
    }

    #[test]
    fn test_canonicalization_is_idempotent() {
        let v = json!({"b": [1, {"d": 4, "c": 3}], "a": "x"});
        let once = canonical_json(&v).unwrap();
        let reparsed: Value = serde_json::from_str(&once).unwrap();
        assert_eq!(canonical_json(&reparsed).unwrap(), once);
    }

    #[test]
    fn test_hash_is_stable() {
        let v = json!({"portfolio_id": "p1", "weight": "0.5"});
        let h1 = hash_canonical(&v).unwrap();
        let h2 = hash_canonical(&v).unwrap();
        assert_eq!(h1, h2);
        assert!(h1.starts_with("sha256:"));
        assert_eq!(h1.len(), "sha256:".len() + 64);
    }

    #[test]
    fn test_artifact_hash_ignores_volatile_fields() {
        let a = json!({
            "run_id": "run_1",
            "created_at": "2026-01-01T00:00:00Z",
            "evidence_bundle": {"hashes": {"artifact_hash": "sha256:aaa", "request_hash": "sha256:bbb"}}
        });
        let b = json!({
            "run_id": "run_1",
            "created_at": "2026-06-30T12:00:00Z",
            "evidence_bundle": {"hashes": {"artifact_hash": "sha256:ccc", "request_hash": "sha256:bbb"}}
        });
        assert_eq!(artifact_hash(&a).unwrap(), artifact_hash(&b).unwrap());
    }

    #[test]
    fn test_string_escapes() {
        let v = json!({"msg": "line\nbreak \"quoted\""});
        assert_eq!(
            canonical_json(&v).unwrap(),
            r#"{"msg":"line\nbreak \"quoted\""}"#
        );
    }
}
