//! Stored-document validation.

use crate::error::{DbError, DbResult};
use gasdb_codec::{Value, TYPE_KEY};

/// Validates a document before it enters a collection.
///
/// Checks, at every nesting depth:
///
/// - no operator-shaped keys (`$`-prefixed)
/// - no reserved codec keys (`__type`)
/// - no non-finite numbers (NaN, ±∞)
///
/// and at the top level that `_id`, when present, is a non-empty
/// string.
///
/// # Errors
///
/// Returns `InvalidDocument` describing the first violation found.
pub fn validate_document(doc: &Value) -> DbResult<()> {
    let Value::Object(_) = doc else {
        return Err(DbError::invalid_document(format!(
            "a document must be an object, got {}",
            doc.type_name()
        )));
    };

    if let Some(id) = doc.get("_id") {
        match id {
            Value::String(s) if !s.is_empty() => {}
            Value::String(_) => {
                return Err(DbError::invalid_document("_id must be a non-empty string"))
            }
            other => {
                return Err(DbError::invalid_document(format!(
                    "_id must be a string, got {}",
                    other.type_name()
                )))
            }
        }
    }

    walk(doc)
}

fn walk(value: &Value) -> DbResult<()> {
    match value {
        Value::Number(n) if !n.is_finite() => Err(DbError::invalid_document(
            "non-finite numbers cannot be stored",
        )),
        Value::Array(items) => {
            for item in items {
                walk(item)?;
            }
            Ok(())
        }
        Value::Object(pairs) => {
            for (key, val) in pairs {
                if key.starts_with('$') {
                    return Err(DbError::invalid_document(format!(
                        "operator-shaped key {key:?} is not allowed in a stored document"
                    )));
                }
                if key == TYPE_KEY {
                    return Err(DbError::invalid_document(format!(
                        "reserved key {TYPE_KEY:?} is not allowed in a stored document"
                    )));
                }
                walk(val)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
