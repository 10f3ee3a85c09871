//! Notarization: hash-stamped, append-only records of completed substeps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::process::Actor;

/// Immutable record of one completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notarization {
    pub id: String,
    pub process_id: String,
    pub substep_id: String,
    pub payload: Value,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
    /// Hex SHA-256 of the canonical JSON of `payload`
    pub digest: String,
}

impl Notarization {
    pub fn new(
        process_id: &str,
        substep_id: &str,
        payload: Value,
        actor: Actor,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let digest = payload_digest(&payload);
        Self {
            id: Uuid::new_v4().to_string(),
            process_id: process_id.to_string(),
            substep_id: substep_id.to_string(),
            payload,
            actor,
            timestamp,
            digest,
        }
    }

    /// Recompute the digest and compare with the stored one
    pub fn verify(&self) -> bool {
        payload_digest(&self.payload) == self.digest
    }
}

/// Compact JSON with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Lowercase hex SHA-256 of arbitrary bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn payload_digest(payload: &Value) -> String {
    sha256_hex(canonical_json(payload).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actor() -> Actor {
        Actor {
            user_id: "u1".to_string(),
            role: "dep1".to_string(),
            workflow_key: "demo".to_string(),
        }
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": [true, null], "y": "s"}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"y":"s","z":[true,null]},"b":1}"#
        );
    }

    #[test]
    fn test_digest_independent_of_key_order() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":{"p":"q","o":2}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":{"o":2,"p":"q"},"x":1}"#).unwrap();
        assert_eq!(payload_digest(&a), payload_digest(&b));
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_notarization_verifies() {
        let mut record = Notarization::new(
            "p1",
            "1.1",
            json!({"policy_owner": "Ada"}),
            actor(),
            Utc::now(),
        );
        assert!(record.verify());
        assert_eq!(record.digest.len(), 64);

        record.payload = json!({"policy_owner": "Mallory"});
        assert!(!record.verify());
    }

    #[test]
    fn test_escaped_keys() {
        let value = json!({"quote\"key": "line\nbreak"});
        assert_eq!(canonical_json(&value), r#"{"quote\"key":"line\nbreak"}"#);
    }
}
