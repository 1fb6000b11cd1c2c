//! Encoding document values to tagged JSON.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use crate::TYPE_KEY;
use chrono::SecondsFormat;
use serde_json::{json, Map, Number};

/// Largest integer magnitude `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

/// Encodes a document value to its JSON wire form.
///
/// Dates become `{"__type": "Date", "value": "<ISO-8601>"}` so the
/// decoder can revive them as instants. Integral numbers within safe
/// range are emitted as JSON integers to keep stored blobs clean.
///
/// # Errors
///
/// Returns [`CodecError::NonFiniteNumber`] for NaN or ±∞ anywhere in
/// the value.
pub fn to_json(value: &Value) -> CodecResult<serde_json::Value> {
    match value {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => encode_number(*n),
        Value::String(s) => Ok(serde_json::Value::String(s.clone())),
        Value::Date(d) => {
            let mut map = Map::with_capacity(2);
            map.insert(TYPE_KEY.to_string(), json!("Date"));
            map.insert(
                "value".to_string(),
                json!(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
            Ok(serde_json::Value::Object(map))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(to_json(item)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        Value::Object(pairs) => {
            let mut map = Map::with_capacity(pairs.len());
            for (key, val) in pairs {
                map.insert(key.clone(), to_json(val)?);
            }
            Ok(serde_json::Value::Object(map))
        }
    }
}

/// Encodes a document value to a JSON string.
///
/// # Errors
///
/// Same as [`to_json`], plus underlying serialisation failures.
pub fn to_json_string(value: &Value) -> CodecResult<String> {
    Ok(serde_json::to_string(&to_json(value)?)?)
}

fn encode_number(n: f64) -> CodecResult<serde_json::Value> {
    if !n.is_finite() {
        return Err(CodecError::NonFiniteNumber);
    }
    #[allow(clippy::cast_possible_truncation)]
    if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        return Ok(serde_json::Value::Number(Number::from(n as i64)));
    }
    // Finite non-integral values always have an exact JSON number form.
    Number::from_f64(n)
        .map(serde_json::Value::Number)
        .ok_or(CodecError::NonFiniteNumber)
}
