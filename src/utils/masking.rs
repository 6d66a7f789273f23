//! Credential masking for values that leave the service
//!
//! Configuration trees routinely embed subscription keys and API secrets.
//! Anything serialized for a client (the config endpoint, plugin status
//! output) passes through `mask_sensitive` first.

use serde_json::Value;

/// Placeholder written in place of masked values.
pub const MASKED: &str = "***MASKED***";

/// Key fragments that mark a value as sensitive.
const SENSITIVE_KEYS: [&str; 5] = ["api_key", "key", "password", "secret", "token"];

/// Returns true when a key names a credential-bearing field.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|s| lower.contains(s))
}

/// Recursively mask sensitive values in a JSON tree.
///
/// Object entries whose key contains a sensitive fragment are replaced with
/// [`MASKED`]; nested objects and arrays are walked. Scalars pass through.
pub fn mask_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut masked = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_object() && !val.is_array() {
                    masked.insert(key.clone(), Value::String(MASKED.to_string()));
                } else {
                    masked.insert(key.clone(), mask_sensitive(val));
                }
            }
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(mask_sensitive).collect()),
        other => other.clone(),
    }
}
