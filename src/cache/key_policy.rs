use crate::shared::dumps_json;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const DEFAULT_KEY_VERSION: &str = "v1";
pub const DEFAULT_MAX_KEY_LENGTH: usize = 240;

#[derive(Debug, thiserror::Error)]
pub enum CacheKeyError {
    #[error("prefix must be a non-empty string")]
    EmptyPrefix,
    #[error("version must be a non-empty string")]
    EmptyVersion,
    #[error("max_key_length must be positive")]
    InvalidMaxKeyLength,
    #[error("non-finite float values are not allowed in cache key parts")]
    NonFiniteFloat,
}

impl CacheKeyError {
    pub fn code(&self) -> &'static str {
        "invalid_argument"
    }
}

/// Lift a raw float into a cache-key part. Non-finite values are
/// rejected rather than silently serialized.
pub fn key_float(value: f64) -> Result<Value, CacheKeyError> {
    if !value.is_finite() {
        return Err(CacheKeyError::NonFiniteFloat);
    }
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or(CacheKeyError::NonFiniteFloat)
}

/// Deterministic cache key: `{prefix}:{version}:{canonical-parts}`, or
/// `{prefix}:{version}:h:{sha256-hex}` once the direct form exceeds
/// `max_key_length`. Same parts always produce the same key regardless of
/// map insertion order.
pub fn make_cache_key(
    prefix: &str,
    parts: &Map<String, Value>,
    version: &str,
    max_key_length: usize,
) -> Result<String, CacheKeyError> {
    if prefix.is_empty() {
        return Err(CacheKeyError::EmptyPrefix);
    }
    if version.is_empty() {
        return Err(CacheKeyError::EmptyVersion);
    }
    if max_key_length == 0 {
        return Err(CacheKeyError::InvalidMaxKeyLength);
    }

    let ordered = parts.iter().collect::<BTreeMap<_, _>>();
    let items = ordered
        .into_iter()
        .map(|(key, value)| json!([key, normalize_value(value)]))
        .collect::<Vec<_>>();
    let serialized = dumps_json(&Value::Array(items));

    let direct = format!("{prefix}:{version}:{serialized}");
    if direct.len() <= max_key_length {
        return Ok(direct);
    }

    let mut hasher = Sha256::new();
    hasher.update(direct.as_bytes());
    let digest = hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    Ok(format!("{prefix}:{version}:h:{digest}"))
}

/// Floats get a stable textual wrapper so the key bytes do not depend on
/// platform float formatting quirks.
fn normalize_value(value: &Value) -> Value {
    match value {
        Value::Number(number) if number.is_f64() => {
            json!({ "__float__": number.to_string() })
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_value).collect()),
        Value::Object(map) => {
            let normalized = map
                .iter()
                .map(|(key, item)| (key.clone(), normalize_value(item)))
                .collect::<Map<_, _>>();
            Value::Object(normalized)
        }
        other => other.clone(),
    }
}
