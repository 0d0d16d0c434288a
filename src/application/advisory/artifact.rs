//! Run artifact packaging.
//!
//! An artifact is a canonical JSON document combining a pipeline result
//! with an evidence bundle. Its hash is computed with volatile fields
//! excluded, then embedded back into the bundle, so two reads of the same
//! artifact always agree on `artifact_hash`.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::domain::canonical;
use crate::domain::errors::CanonicalError;
use crate::domain::model::result::ENGINE_VERSION;

pub const ARTIFACT_VERSION: u32 = 1;

/// Package a result payload (rebalance or proposal) into an artifact.
pub fn build_artifact(
    result: &Value,
    request_hash: &str,
    created_at: DateTime<Utc>,
) -> Result<Value, CanonicalError> {
    let mut artifact = json!({
        "artifact_version": ARTIFACT_VERSION,
        "result": result,
        "created_at": created_at.to_rfc3339(),
        "evidence_bundle": {
            "engine_version": ENGINE_VERSION,
            "hashes": {
                "request_hash": request_hash,
                "artifact_hash": Value::Null,
            },
        },
    });
    let hash = canonical::artifact_hash(&artifact)?;
    artifact["evidence_bundle"]["hashes"]["artifact_hash"] = Value::String(hash);
    Ok(artifact)
}

pub fn artifact_hash_of(artifact: &Value) -> Result<String, CanonicalError> {
    canonical::artifact_hash(artifact)
}

pub fn embedded_hash(artifact: &Value) -> Option<&str> {
    artifact["evidence_bundle"]["hashes"]["artifact_hash"].as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_hash_stable_across_created_at() {
        let result = json!({"run_id": "run_1", "status": "READY"});
        let t1 = "2026-01-01T00:00:00Z".parse().unwrap();
        let t2 = "2026-06-30T12:00:00Z".parse().unwrap();
        let a1 = build_artifact(&result, "sha256:abc", t1).unwrap();
        let a2 = build_artifact(&result, "sha256:abc", t2).unwrap();
        assert_eq!(embedded_hash(&a1), embedded_hash(&a2));
    }

    #[test]
    fn test_embedded_hash_matches_recomputation() {
        let result = json!({"run_id": "run_1"});
        let artifact = build_artifact(&result, "sha256:abc", Utc::now()).unwrap();
        let embedded = embedded_hash(&artifact).unwrap().to_string();
        assert_eq!(artifact_hash_of(&artifact).unwrap(), embedded);
    }

    #[test]
    fn test_different_results_hash_differently() {
        let now = Utc::now();
        let a = build_artifact(&json!({"run_id": "run_1"}), "sha256:abc", now).unwrap();
        let b = build_artifact(&json!({"run_id": "run_2"}), "sha256:abc", now).unwrap();
        assert_ne!(embedded_hash(&a), embedded_hash(&b));
    }
}
