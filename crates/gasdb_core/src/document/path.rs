//! Dotted field paths.
//!
//! A path like `"a.b.0.c"` addresses a location inside a document. A
//! numeric segment is an array index when the parent is an array and an
//! ordinary key when the parent is an object.
//!
//! Reads distinguish *missing* from explicit `null`: resolution yields
//! the list of values found, and an empty list means the path does not
//! exist. When a segment lands on an array and the next segment is not
//! numeric, resolution fans out over the elements (the query engine
//! folds the results with logical OR).
//!
//! Writes create missing intermediate objects, never arrays, and never
//! pad arrays: a numeric index may address an existing element or the
//! position immediately past the end.

use crate::error::{DbError, DbResult};
use gasdb_codec::Value;
use thiserror::Error;

/// A malformed dotted path.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid field path {path:?}: {reason}")]
pub struct PathError {
    /// The raw path text.
    pub path: String,
    /// Why it failed to parse.
    pub reason: &'static str,
}

/// A parsed dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dotted path.
    ///
    /// # Errors
    ///
    /// Fails on an empty path or an empty segment (`"a..b"`, `".a"`).
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError {
                path: raw.to_string(),
                reason: "path is empty",
            });
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PathError {
                path: raw.to_string(),
                reason: "path has an empty segment",
            });
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Returns the raw path text.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the first segment.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.segments[0]
    }

    /// True if this path addresses exactly the given top-level key.
    #[must_use]
    pub fn is_top_level(&self, key: &str) -> bool {
        self.segments.len() == 1 && self.segments[0] == key
    }

    /// Resolves the path against a document.
    ///
    /// Returns every value the path reaches; an empty result means the
    /// path is *missing* (distinct from an explicit `null`, which is
    /// returned as a value).
    #[must_use]
    pub fn resolve<'a>(&self, doc: &'a Value) -> Vec<&'a Value> {
        let mut out = Vec::new();
        gather(doc, &self.segments, &mut out);
        out
    }

    /// Resolves the path to the single location a write would target.
    ///
    /// Unlike [`FieldPath::resolve`], array traversal here requires an
    /// explicit numeric segment; there is no existential fan-out.
    /// Returns `None` when anything along the path is missing or
    /// untraversable (the subsequent write decides whether that is
    /// creatable or an error).
    #[must_use]
    pub fn resolve_for_write<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut current = doc;
        for seg in &self.segments {
            current = match current {
                Value::Object(_) => current.get(seg)?,
                Value::Array(items) => items.get(parse_index(seg)?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Writes `value` at this path, creating missing intermediate
    /// objects.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUpdate` when the path traverses a scalar, when a
    /// non-numeric segment meets an array, or when a numeric index lies
    /// beyond the end of an array (no padding is performed).
    pub fn set(&self, doc: &mut Value, value: Value) -> DbResult<()> {
        let Some((last, parents)) = self.segments.split_last() else {
            return Err(DbError::internal("field path with no segments"));
        };

        let mut current = doc;
        for seg in parents {
            current = descend_creating(current, seg, &self.raw)?;
        }

        match current {
            Value::Object(_) => {
                current.insert(last, value);
                Ok(())
            }
            Value::Array(items) => {
                let idx = parse_index(last).ok_or_else(|| {
                    DbError::invalid_update(format!(
                        "cannot create field {last:?} inside an array at {:?}",
                        self.raw
                    ))
                })?;
                if idx < items.len() {
                    items[idx] = value;
                    Ok(())
                } else if idx == items.len() {
                    items.push(value);
                    Ok(())
                } else {
                    Err(DbError::invalid_update(format!(
                        "array index {idx} out of range (len {}) at {:?}",
                        items.len(),
                        self.raw
                    )))
                }
            }
            other => Err(DbError::invalid_update(format!(
                "cannot write through {} at {:?}",
                other.type_name(),
                self.raw
            ))),
        }
    }

    /// Removes the value at this path.
    ///
    /// Returns whether anything was removed; an absent path is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUpdate` when the final parent is an array:
    /// removing by index would renumber siblings.
    pub fn unset(&self, doc: &mut Value) -> DbResult<bool> {
        let Some((last, parents)) = self.segments.split_last() else {
            return Err(DbError::internal("field path with no segments"));
        };

        let mut current = doc;
        for seg in parents {
            let next = match current {
                Value::Object(_) => current.get_mut(seg),
                Value::Array(items) => parse_index(seg).and_then(|i| items.get_mut(i)),
                _ => None,
            };
            match next {
                Some(v) => current = v,
                None => return Ok(false),
            }
        }

        match current {
            Value::Object(_) => Ok(current.remove(last).is_some()),
            Value::Array(_) => Err(DbError::invalid_update(format!(
                "cannot remove array element at {:?}",
                self.raw
            ))),
            _ => Ok(false),
        }
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn gather<'a>(value: &'a Value, segments: &[String], out: &mut Vec<&'a Value>) {
    let Some((seg, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Object(_) => {
            if let Some(next) = value.get(seg) {
                gather(next, rest, out);
            }
        }
        Value::Array(items) => {
            if let Some(idx) = parse_index(seg) {
                if let Some(next) = items.get(idx) {
                    gather(next, rest, out);
                }
            } else {
                // Existential traversal: the pending segment applies to
                // every element.
                for item in items {
                    gather(item, segments, out);
                }
            }
        }
        _ => {}
    }
}

fn descend_creating<'a>(current: &'a mut Value, seg: &str, raw: &str) -> DbResult<&'a mut Value> {
    match current {
        Value::Object(_) => {
            if !current.contains_key(seg) {
                current.insert(seg, Value::Object(Vec::new()));
            }
            current
                .get_mut(seg)
                .ok_or_else(|| DbError::internal("intermediate object key vanished"))
        }
        Value::Array(items) => {
            let len = items.len();
            let idx = parse_index(seg).ok_or_else(|| {
                DbError::invalid_update(format!(
                    "cannot create field {seg:?} inside an array at {raw:?}"
                ))
            })?;
            items.get_mut(idx).ok_or_else(|| {
                DbError::invalid_update(format!(
                    "array index {idx} out of range (len {len}) at {raw:?}"
                ))
            })
        }
        other => Err(DbError::invalid_update(format!(
            "cannot write through {} at {raw:?}",
            other.type_name()
        ))),
    }
}

fn parse_index(seg: &str) -> Option<usize> {
    if seg.bytes().all(|b| b.is_ascii_digit()) {
        seg.parse().ok()
    } else {
        None
    }
}
