//! Compiled filter expressions.
//!
//! A filter is a JSON-shaped predicate over documents:
//!
//! - `{}` matches every document.
//! - A top-level key not starting with `$` is a dotted field path whose
//!   value is either a literal (implicit equality) or an operator
//!   object like `{"$gt": 5, "$lt": 10}`.
//! - `$and` / `$or` take a non-empty array of sub-filters.
//!
//! Compilation validates the whole expression up front and bounds both
//! nesting depth and total condition count, so evaluation is
//! infallible and cannot exhaust the stack on adversarial input.

use crate::document::FieldPath;
use crate::error::{DbError, DbResult};
use gasdb_codec::Value;
use std::cmp::Ordering;

/// Maximum nesting depth of a filter expression.
pub const MAX_FILTER_DEPTH: usize = 16;

/// Maximum number of conditions across a whole filter expression.
pub const MAX_FILTER_CONDITIONS: usize = 64;

/// A compiled filter expression.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Conjunction of sub-filters. Empty means "match everything".
    And(Vec<Filter>),
    /// Disjunction of sub-filters.
    Or(Vec<Filter>),
    /// Predicates against one dotted field path.
    Field {
        /// The path the predicates apply to.
        path: FieldPath,
        /// All predicates must hold for the field to match.
        predicates: Vec<Predicate>,
    },
}

/// A single field predicate.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Deep structural equality.
    Eq(Value),
    /// Negated deep equality. Holds on missing paths.
    Ne(Value),
    /// Strictly greater, same type class.
    Gt(Value),
    /// Greater or equal, same type class.
    Gte(Value),
    /// Strictly less, same type class.
    Lt(Value),
    /// Less or equal, same type class.
    Lte(Value),
    /// Membership in the argument array.
    In(Vec<Value>),
    /// Absence from the argument array. Holds on missing paths.
    Nin(Vec<Value>),
    /// Path presence. Explicit `null` counts as present.
    Exists(bool),
}

impl Filter {
    /// Compiles a filter expression.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for a non-object filter, an unknown
    /// operator, a malformed operator argument, or a filter exceeding
    /// the depth/condition bounds.
    pub fn compile(filter: &Value) -> DbResult<Self> {
        let mut conditions = 0usize;
        compile_filter(filter, 0, &mut conditions)
    }

    /// Evaluates this filter against a document.
    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::And(subs) => subs.iter().all(|f| f.matches(doc)),
            Filter::Or(subs) => subs.iter().any(|f| f.matches(doc)),
            Filter::Field { path, predicates } => {
                let candidates = path.resolve(doc);
                predicates.iter().all(|p| p.holds(&candidates))
            }
        }
    }
}

impl Predicate {
    /// Evaluates this predicate against the values a path resolved to.
    ///
    /// An empty candidate list means the path is missing. Predicates
    /// over multiple candidates (existential array traversal) hold when
    /// any candidate satisfies them, except the negated forms, which
    /// hold only when no candidate violates them.
    pub(crate) fn holds(&self, candidates: &[&Value]) -> bool {
        match self {
            Predicate::Eq(target) => candidates.iter().any(|v| v.deep_eq(target)),
            Predicate::Ne(target) => !candidates.iter().any(|v| v.deep_eq(target)),
            Predicate::Gt(target) => ordered(candidates, target, &[Ordering::Greater]),
            Predicate::Gte(target) => {
                ordered(candidates, target, &[Ordering::Greater, Ordering::Equal])
            }
            Predicate::Lt(target) => ordered(candidates, target, &[Ordering::Less]),
            Predicate::Lte(target) => {
                ordered(candidates, target, &[Ordering::Less, Ordering::Equal])
            }
            Predicate::In(options) => candidates
                .iter()
                .any(|v| options.iter().any(|o| v.deep_eq(o))),
            Predicate::Nin(options) => !candidates
                .iter()
                .any(|v| options.iter().any(|o| v.deep_eq(o))),
            Predicate::Exists(wanted) => *wanted == !candidates.is_empty(),
        }
    }

    /// Evaluates this predicate against one value (no path resolution).
    ///
    /// Used by `$pull` to test array elements directly.
    pub(crate) fn holds_for(&self, value: &Value) -> bool {
        self.holds(&[value])
    }
}

fn ordered(candidates: &[&Value], target: &Value, accept: &[Ordering]) -> bool {
    candidates
        .iter()
        .any(|v| v.compare(target).is_some_and(|ord| accept.contains(&ord)))
}

fn compile_filter(filter: &Value, depth: usize, conditions: &mut usize) -> DbResult<Filter> {
    if depth > MAX_FILTER_DEPTH {
        return Err(DbError::invalid_query(format!(
            "filter exceeds maximum depth of {MAX_FILTER_DEPTH}"
        )));
    }
    let Value::Object(pairs) = filter else {
        return Err(DbError::invalid_query(format!(
            "a filter must be an object, got {}",
            filter.type_name()
        )));
    };

    let mut subs = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        if let Some(op) = key.strip_prefix('$') {
            subs.push(compile_logical(op, value, depth, conditions)?);
        } else {
            subs.push(compile_field(key, value, conditions)?);
        }
    }

    if subs.len() == 1 {
        let Some(only) = subs.pop() else {
            return Err(DbError::internal("sub-filter vanished"));
        };
        Ok(only)
    } else {
        Ok(Filter::And(subs))
    }
}

fn compile_logical(
    op: &str,
    value: &Value,
    depth: usize,
    conditions: &mut usize,
) -> DbResult<Filter> {
    if op != "and" && op != "or" {
        return Err(DbError::invalid_query(format!(
            "unknown logical operator ${op}"
        )));
    }
    let Value::Array(items) = value else {
        return Err(DbError::invalid_query(format!(
            "${op} requires an array of sub-filters, got {}",
            value.type_name()
        )));
    };
    if items.is_empty() {
        return Err(DbError::invalid_query(format!(
            "${op} requires a non-empty array"
        )));
    }

    let mut subs = Vec::with_capacity(items.len());
    for item in items {
        subs.push(compile_filter(item, depth + 1, conditions)?);
    }
    if op == "and" {
        Ok(Filter::And(subs))
    } else {
        Ok(Filter::Or(subs))
    }
}

fn compile_field(key: &str, value: &Value, conditions: &mut usize) -> DbResult<Filter> {
    let path = FieldPath::parse(key).map_err(|e| DbError::invalid_query(e.to_string()))?;

    let predicates = match value {
        Value::Object(pairs) if pairs.iter().any(|(k, _)| k.starts_with('$')) => {
            if !pairs.iter().all(|(k, _)| k.starts_with('$')) {
                return Err(DbError::invalid_query(format!(
                    "cannot mix operators and plain keys in the condition on {key:?}"
                )));
            }
            let mut out = Vec::with_capacity(pairs.len());
            for (op, arg) in pairs {
                out.push(compile_predicate(op, arg)?);
            }
            out
        }
        literal => vec![Predicate::Eq(literal.clone())],
    };

    *conditions += predicates.len().max(1);
    if *conditions > MAX_FILTER_CONDITIONS {
        return Err(DbError::invalid_query(format!(
            "filter exceeds maximum of {MAX_FILTER_CONDITIONS} conditions"
        )));
    }

    Ok(Filter::Field { path, predicates })
}

pub(crate) fn compile_predicate(op: &str, arg: &Value) -> DbResult<Predicate> {
    match op {
        "$eq" => Ok(Predicate::Eq(arg.clone())),
        "$ne" => Ok(Predicate::Ne(arg.clone())),
        "$gt" => Ok(Predicate::Gt(arg.clone())),
        "$gte" => Ok(Predicate::Gte(arg.clone())),
        "$lt" => Ok(Predicate::Lt(arg.clone())),
        "$lte" => Ok(Predicate::Lte(arg.clone())),
        "$in" | "$nin" => {
            let Value::Array(options) = arg else {
                return Err(DbError::invalid_query(format!(
                    "{op} requires an array, got {}",
                    arg.type_name()
                )));
            };
            if op == "$in" {
                Ok(Predicate::In(options.clone()))
            } else {
                Ok(Predicate::Nin(options.clone()))
            }
        }
        "$exists" => {
            let Value::Bool(wanted) = arg else {
                return Err(DbError::invalid_query(format!(
                    "$exists requires a boolean, got {}",
                    arg.type_name()
                )));
            };
            Ok(Predicate::Exists(*wanted))
        }
        other => Err(DbError::invalid_query(format!(
            "unknown field operator {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasdb_codec::from_json;
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        from_json(&json).unwrap()
    }

    fn matches(doc: serde_json::Value, filter: serde_json::Value) -> bool {
        Filter::compile(&v(filter)).unwrap().matches(&v(doc))
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches(json!({"_id": "a"}), json!({})));
        assert!(matches(json!({}), json!({})));
    }

    #[test]
    fn implicit_equality() {
        assert!(matches(json!({"name": "Anna"}), json!({"name": "Anna"})));
        assert!(!matches(json!({"name": "Ben"}), json!({"name": "Anna"})));
    }

    #[test]
    fn implicit_equality_with_dotted_path() {
        let filter = json!({"name.first": "Anna"});
        assert!(matches(json!({"name": {"first": "Anna"}}), filter.clone()));
        assert!(!matches(json!({"name": {"first": "Ben"}}), filter));
    }

    #[test]
    fn implicit_equality_against_array_literal_is_structural() {
        let filter = json!({"tags": ["red", "blue"]});
        assert!(matches(json!({"tags": ["red", "blue"]}), filter.clone()));
        // No element-wise or subset matching.
        assert!(!matches(json!({"tags": ["blue", "red"]}), filter.clone()));
        assert!(!matches(json!({"tags": ["red"]}), filter));
    }

    #[test]
    fn comparison_operators() {
        assert!(matches(json!({"age": 30}), json!({"age": {"$gt": 25}})));
        assert!(!matches(json!({"age": 20}), json!({"age": {"$gt": 25}})));
        assert!(matches(json!({"age": 25}), json!({"age": {"$gte": 25}})));
        assert!(matches(json!({"age": 20}), json!({"age": {"$lt": 25}})));
        assert!(matches(json!({"age": 25}), json!({"age": {"$lte": 25}})));
        assert!(matches(json!({"age": 30}), json!({"age": {"$ne": 25}})));
        assert!(!matches(json!({"age": 25}), json!({"age": {"$ne": 25}})));
    }

    #[test]
    fn operator_conjunction_on_one_field() {
        let filter = json!({"age": {"$gt": 18, "$lt": 65}});
        assert!(matches(json!({"age": 30}), filter.clone()));
        assert!(!matches(json!({"age": 70}), filter.clone()));
        assert!(!matches(json!({"age": 10}), filter));
    }

    #[test]
    fn cross_type_comparisons_never_match() {
        assert!(!matches(json!({"age": "30"}), json!({"age": {"$gt": 25}})));
        assert!(!matches(json!({"age": 30}), json!({"age": {"$gt": "25"}})));
        assert!(!matches(json!({"age": null}), json!({"age": {"$lt": 25}})));
    }

    #[test]
    fn string_comparison_is_lexicographic() {
        assert!(matches(json!({"name": "b"}), json!({"name": {"$gt": "a"}})));
        assert!(!matches(json!({"name": "a"}), json!({"name": {"$gt": "b"}})));
    }

    #[test]
    fn in_and_nin() {
        let filter = json!({"color": {"$in": ["red", "green"]}});
        assert!(matches(json!({"color": "red"}), filter.clone()));
        assert!(!matches(json!({"color": "blue"}), filter));

        let filter = json!({"color": {"$nin": ["red", "green"]}});
        assert!(matches(json!({"color": "blue"}), filter.clone()));
        assert!(!matches(json!({"color": "red"}), filter.clone()));
        // Missing field is not in the list.
        assert!(matches(json!({}), filter));
    }

    #[test]
    fn ne_holds_on_missing_path() {
        assert!(matches(json!({}), json!({"age": {"$ne": 25}})));
    }

    #[test]
    fn exists_counts_null_as_present() {
        let exists = json!({"nickname": {"$exists": true}});
        assert!(matches(json!({"nickname": null}), exists.clone()));
        assert!(matches(json!({"nickname": "Ann"}), exists.clone()));
        assert!(!matches(json!({}), exists));

        let absent = json!({"nickname": {"$exists": false}});
        assert!(matches(json!({}), absent.clone()));
        assert!(!matches(json!({"nickname": null}), absent));
    }

    #[test]
    fn logical_and() {
        let filter = json!({"$and": [{"age": {"$gt": 25}}, {"isActive": true}]});
        assert!(matches(json!({"age": 29, "isActive": true}), filter.clone()));
        assert!(!matches(json!({"age": 29, "isActive": false}), filter.clone()));
        assert!(!matches(json!({"age": 20, "isActive": true}), filter));
    }

    #[test]
    fn logical_or() {
        let filter = json!({"$or": [{"age": {"$lt": 18}}, {"age": {"$gt": 65}}]});
        assert!(matches(json!({"age": 10}), filter.clone()));
        assert!(matches(json!({"age": 70}), filter.clone()));
        assert!(!matches(json!({"age": 30}), filter));
    }

    #[test]
    fn nested_logical_operators() {
        let filter = json!({"$or": [
            {"$and": [{"a": 1}, {"b": 2}]},
            {"c": 3}
        ]});
        assert!(matches(json!({"a": 1, "b": 2}), filter.clone()));
        assert!(matches(json!({"c": 3}), filter.clone()));
        assert!(!matches(json!({"a": 1}), filter));
    }

    #[test]
    fn multiple_top_level_fields_are_a_conjunction() {
        let filter = json!({"a": 1, "b": 2});
        assert!(matches(json!({"a": 1, "b": 2}), filter.clone()));
        assert!(!matches(json!({"a": 1, "b": 3}), filter));
    }

    #[test]
    fn existential_match_across_arrays() {
        let doc = json!({"orders": [{"total": 5}, {"total": 12}]});
        assert!(matches(doc.clone(), json!({"orders.total": {"$gt": 10}})));
        assert!(!matches(doc, json!({"orders.total": {"$gt": 20}})));
    }

    #[test]
    fn numeric_segment_selects_one_element() {
        let doc = json!({"orders": [{"total": 5}, {"total": 12}]});
        assert!(matches(doc.clone(), json!({"orders.1.total": 12})));
        assert!(!matches(doc, json!({"orders.0.total": 12})));
    }

    #[test]
    fn unknown_operator_rejected() {
        let result = Filter::compile(&v(json!({"a": {"$regex": "x"}})));
        assert!(matches!(result, Err(DbError::InvalidQuery { .. })));

        let result = Filter::compile(&v(json!({"$nor": [{"a": 1}]})));
        assert!(matches!(result, Err(DbError::InvalidQuery { .. })));
    }

    #[test]
    fn malformed_operator_arguments_rejected() {
        for filter in [
            json!({"$and": {"a": 1}}),
            json!({"$and": []}),
            json!({"$or": []}),
            json!({"a": {"$in": 5}}),
            json!({"a": {"$exists": "yes"}}),
        ] {
            let result = Filter::compile(&v(filter));
            assert!(matches!(result, Err(DbError::InvalidQuery { .. })));
        }
    }

    #[test]
    fn mixed_operator_and_plain_keys_rejected() {
        let result = Filter::compile(&v(json!({"a": {"$gt": 1, "b": 2}})));
        assert!(matches!(result, Err(DbError::InvalidQuery { .. })));
    }

    #[test]
    fn non_object_filter_rejected() {
        assert!(Filter::compile(&v(json!("nope"))).is_err());
        assert!(Filter::compile(&v(json!([1, 2]))).is_err());
    }

    #[test]
    fn excessive_depth_rejected() {
        let mut filter = json!({"a": 1});
        for _ in 0..(MAX_FILTER_DEPTH + 2) {
            filter = json!({"$and": [filter]});
        }
        let result = Filter::compile(&v(filter));
        assert!(matches!(result, Err(DbError::InvalidQuery { .. })));
    }

    #[test]
    fn excessive_condition_count_rejected() {
        let subs: Vec<serde_json::Value> = (0..(MAX_FILTER_CONDITIONS + 1))
            .map(|i| {
                let mut field = serde_json::Map::new();
                field.insert(format!("f{i}"), json!(i));
                serde_json::Value::Object(field)
            })
            .collect();
        let result = Filter::compile(&v(json!({"$and": subs})));
        assert!(matches!(result, Err(DbError::InvalidQuery { .. })));
    }
}
