//! Canonical Argument Hashing
//!
//! The idempotence hash of an operation is a SHA-256 digest over its kind
//! tag and a canonical serialization of its constructor arguments. The
//! canonical form sorts object keys recursively, so the hash is stable
//! across serializer versions, map iteration orders and process restarts —
//! the property both exact-repeat detection and deferred-operation grouping
//! depend on.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonical textual form of a JSON value: object keys sorted recursively,
/// arrays in order, scalars in serde_json's standard rendering.
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
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                // serde's string rendering handles escaping
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Idempotence hash for an operation: kind tag plus canonical arguments
pub fn operation_hash(kind: &str, arguments: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(canonical_json(arguments).as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}
