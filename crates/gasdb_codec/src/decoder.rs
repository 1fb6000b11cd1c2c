//! Decoding tagged JSON into document values.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use crate::TYPE_KEY;
use chrono::{DateTime, Utc};

/// Decodes a JSON value into a document value.
///
/// Objects carrying `{"__type": "Date", "value": ...}` are revived as
/// date instants. Plain strings are never implicitly treated as dates.
///
/// # Errors
///
/// - [`CodecError::UnknownTypeTag`] for a `__type` tag the codec does
///   not know.
/// - [`CodecError::ReservedKey`] when `__type` appears without naming a
///   tag (it is reserved at every nesting level).
/// - [`CodecError::InvalidDate`] when a tagged date fails to parse.
pub fn from_json(json: &serde_json::Value) -> CodecResult<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            // serde_json numbers are always finite.
            let f = n.as_f64().ok_or(CodecError::NonFiniteNumber)?;
            Ok(Value::Number(f))
        }
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_json(item)?);
            }
            Ok(Value::Array(out))
        }
        serde_json::Value::Object(map) => {
            if let Some(tag) = map.get(TYPE_KEY) {
                return decode_tagged(tag, map);
            }
            let mut pairs = Vec::with_capacity(map.len());
            for (key, val) in map {
                pairs.push((key.clone(), from_json(val)?));
            }
            Ok(Value::Object(pairs))
        }
    }
}

/// Decodes a document value from a JSON string.
///
/// # Errors
///
/// Same as [`from_json`], plus JSON parse failures.
pub fn from_json_str(text: &str) -> CodecResult<Value> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    from_json(&json)
}

/// Parses the tagged date form into an instant.
///
/// Shared with metadata decoding, which carries tagged dates inside its
/// own `__type`-discriminated envelope.
pub fn decode_date(json: &serde_json::Value) -> CodecResult<DateTime<Utc>> {
    let raw = json
        .get("value")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| CodecError::invalid_date(json.to_string()))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| CodecError::invalid_date(raw))
}

fn decode_tagged(
    tag: &serde_json::Value,
    map: &serde_json::Map<String, serde_json::Value>,
) -> CodecResult<Value> {
    match tag.as_str() {
        Some("Date") => {
            let json = serde_json::Value::Object(map.clone());
            Ok(Value::Date(decode_date(&json)?))
        }
        Some(other) => Err(CodecError::unknown_type_tag(other)),
        None => Err(CodecError::reserved_key(TYPE_KEY)),
    }
}
