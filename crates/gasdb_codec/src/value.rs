//! Dynamic document value type.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// A dynamic document value.
///
/// This type represents any value GASDB can store inside a document.
/// Dates are first-class: they survive serialisation boundaries as
/// instants rather than strings.
///
/// Objects preserve insertion order, which matters for update
/// expressions where operators apply in declaration order.
///
/// # Equality
///
/// The derived `PartialEq` compares objects entry-by-entry and is
/// therefore sensitive to key order. Use [`Value::deep_eq`] for the
/// structural, key-order-insensitive equality the query and update
/// engines are specified against.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value. Always finite in stored documents.
    Number(f64),
    /// Text string (UTF-8).
    String(String),
    /// Date, kept as a UTC instant with millisecond precision.
    Date(DateTime<Utc>),
    /// Array of values.
    Array(Vec<Value>),
    /// Object: an ordered list of key/value pairs with unique keys.
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Creates an object value from key/value pairs.
    ///
    /// Later pairs replace earlier ones with the same key, so the
    /// resulting object always has unique keys.
    #[must_use]
    pub fn object(pairs: Vec<(String, Value)>) -> Self {
        let mut out = Value::Object(Vec::with_capacity(pairs.len()));
        for (key, value) in pairs {
            out.insert(&key, value);
        }
        out
    }

    /// Creates an array value.
    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(items)
    }

    /// Checks if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Gets this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Gets this value as a number, if it is one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Gets this value as a string slice, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Gets this value as a date, if it is one.
    #[must_use]
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Gets this value as an array, if it is one.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Gets this value as a mutable array, if it is one.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Gets this value as an object, if it is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Object(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Checks if this value is an object.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Looks up a key in this object value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Looks up a key in this object value, mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Object(pairs) => pairs.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Checks whether this object value contains a key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets a key in this object value.
    ///
    /// An existing entry is replaced in place (its position is kept);
    /// a new entry is appended. No-op on non-objects.
    pub fn insert(&mut self, key: &str, value: Value) {
        if let Value::Object(pairs) = self {
            if let Some(entry) = pairs.iter_mut().find(|(k, _)| k == key) {
                entry.1 = value;
            } else {
                pairs.push((key.to_string(), value));
            }
        }
    }

    /// Removes a key from this object value, returning the prior value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if let Value::Object(pairs) = self {
            if let Some(pos) = pairs.iter().position(|(k, _)| k == key) {
                return Some(pairs.remove(pos).1);
            }
        }
        None
    }

    /// Returns a short name for this value's type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Deep structural equality.
    ///
    /// - Object keys compare order-insensitively; arrays are
    ///   order-sensitive.
    /// - `NaN` is never equal to anything, itself included.
    /// - Dates compare by instant.
    #[must_use]
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.deep_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| other.get(k).is_some_and(|w| v.deep_eq(w)))
            }
            _ => false,
        }
    }

    /// Ordering between two scalar values of the same type class.
    ///
    /// Numbers compare numerically, strings lexicographically, dates by
    /// instant, booleans with `false < true`. Returns `None` across type
    /// classes, for non-scalars, and when either number is `NaN`.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn object_keeps_insertion_order() {
        let obj = Value::object(vec![
            ("z".to_string(), Value::from(1)),
            ("a".to_string(), Value::from(2)),
        ]);

        if let Value::Object(pairs) = &obj {
            assert_eq!(pairs[0].0, "z");
            assert_eq!(pairs[1].0, "a");
        } else {
            panic!("expected object");
        }
    }

    #[test]
    fn object_deduplicates_keys() {
        let obj = Value::object(vec![
            ("a".to_string(), Value::from(1)),
            ("a".to_string(), Value::from(2)),
        ]);

        assert_eq!(obj.as_object().unwrap().len(), 1);
        assert_eq!(obj.get("a"), Some(&Value::from(2)));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut obj = Value::object(vec![
            ("a".to_string(), Value::from(1)),
            ("b".to_string(), Value::from(2)),
        ]);
        obj.insert("a", Value::from(9));

        let pairs = obj.as_object().unwrap();
        assert_eq!(pairs[0], ("a".to_string(), Value::from(9.0)));
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn remove_returns_prior_value() {
        let mut obj = Value::object(vec![("a".to_string(), Value::from(1))]);
        assert_eq!(obj.remove("a"), Some(Value::from(1.0)));
        assert_eq!(obj.remove("a"), None);
    }

    #[test]
    fn deep_eq_ignores_object_key_order() {
        let a = Value::object(vec![
            ("x".to_string(), Value::from(1)),
            ("y".to_string(), Value::from(2)),
        ]);
        let b = Value::object(vec![
            ("y".to_string(), Value::from(2)),
            ("x".to_string(), Value::from(1)),
        ]);

        assert!(a.deep_eq(&b));
        assert_ne!(a, b); // derived equality is order-sensitive
    }

    #[test]
    fn deep_eq_arrays_are_order_sensitive() {
        let a = Value::from(vec![1i64, 2]);
        let b = Value::from(vec![2i64, 1]);
        assert!(!a.deep_eq(&b));
    }

    #[test]
    fn deep_eq_nan_never_equal() {
        let nan = Value::Number(f64::NAN);
        assert!(!nan.deep_eq(&nan));
    }

    #[test]
    fn deep_eq_dates_by_instant() {
        let d1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(Value::Date(d1).deep_eq(&Value::Date(d2)));
    }

    #[test]
    fn compare_within_type_classes() {
        assert_eq!(
            Value::from(1).compare(&Value::from(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::from("b").compare(&Value::from("a")),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::Bool(false).compare(&Value::Bool(true)),
            Some(Ordering::Less)
        );

        let early = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            Value::Date(early).compare(&Value::Date(late)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn compare_across_type_classes_is_none() {
        assert_eq!(Value::from("5").compare(&Value::from(5)), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert_eq!(
            Value::array(vec![]).compare(&Value::array(vec![])),
            None
        );
    }

    #[test]
    fn compare_nan_is_none() {
        assert_eq!(Value::Number(f64::NAN).compare(&Value::from(1)), None);
    }

    #[test]
    fn accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::from(42).as_f64(), Some(42.0));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::from(42).as_str(), None);

        let obj = Value::object(vec![("k".to_string(), Value::from("v"))]);
        assert_eq!(obj.get("k").and_then(Value::as_str), Some("v"));
        assert_eq!(obj.get("missing"), None);
        assert!(obj.contains_key("k"));
    }
}
