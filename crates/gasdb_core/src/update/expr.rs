//! Parsed update expressions.
//!
//! An update expression is an object whose top-level keys are all
//! operators, each mapping dotted paths to arguments:
//!
//! ```text
//! {"$set": {"name.first": "Anna"}, "$inc": {"stats.logins": 1}}
//! ```
//!
//! Parsing validates the whole expression before anything is applied:
//! operator names, argument shapes, paths, and `_id` protection.
//! Actions are kept in declaration order - within one operator object
//! entries apply in insertion order, and operators apply in the order
//! they appear.

use crate::document::FieldPath;
use crate::error::{DbError, DbResult};
use crate::query::{compile_predicate, Filter, Predicate};
use gasdb_codec::Value;

/// A parsed, validated update expression.
#[derive(Debug, Clone)]
pub struct UpdateExpr {
    pub(crate) actions: Vec<UpdateAction>,
}

/// One path-level mutation, in declaration order.
#[derive(Debug, Clone)]
pub(crate) enum UpdateAction {
    /// Assign a value, creating intermediate objects.
    Set { path: FieldPath, value: Value },
    /// Remove a key; no-op when absent.
    Unset { path: FieldPath },
    /// Add to a number; missing counts as 0.
    Inc { path: FieldPath, amount: f64 },
    /// Multiply a number; missing counts as 0.
    Mul { path: FieldPath, factor: f64 },
    /// Replace when the argument is strictly less; set when missing.
    Min { path: FieldPath, value: Value },
    /// Replace when the argument is strictly greater; set when missing.
    Max { path: FieldPath, value: Value },
    /// Append items to an array, creating it when missing.
    Push { path: FieldPath, items: Vec<Value> },
    /// Append items absent by deep equality, creating when missing.
    AddToSet { path: FieldPath, items: Vec<Value> },
    /// Remove all elements matching the condition.
    Pull {
        path: FieldPath,
        condition: PullCondition,
    },
}

/// The element test of a `$pull`.
#[derive(Debug, Clone)]
pub(crate) enum PullCondition {
    /// Remove elements deeply equal to the value.
    Equals(Value),
    /// Remove elements satisfying all operator predicates.
    Operators(Vec<Predicate>),
    /// Remove object elements matching a sub-filter.
    Filter(Filter),
}

impl PullCondition {
    pub(crate) fn matches(&self, element: &Value) -> bool {
        match self {
            PullCondition::Equals(target) => element.deep_eq(target),
            PullCondition::Operators(preds) => preds.iter().all(|p| p.holds_for(element)),
            PullCondition::Filter(filter) => element.is_object() && filter.matches(element),
        }
    }
}

impl UpdateExpr {
    /// Parses and validates an update expression.
    ///
    /// # Errors
    ///
    /// - `InvalidUpdate` for an empty update, plain (non-`$`) top-level
    ///   keys, unknown operators, or malformed arguments.
    /// - `ImmutableField` for any action that could change or remove
    ///   `_id` (a `$set` to the identical value is checked at apply
    ///   time).
    pub fn parse(update: &Value) -> DbResult<Self> {
        let Value::Object(pairs) = update else {
            return Err(DbError::invalid_update(format!(
                "an update must be an object, got {}",
                update.type_name()
            )));
        };
        if pairs.is_empty() {
            return Err(DbError::invalid_update("update has no operators"));
        }

        let mut actions = Vec::new();
        for (op, arg) in pairs {
            if !op.starts_with('$') {
                return Err(DbError::invalid_update(format!(
                    "cannot mix operators and plain fields: key {op:?}"
                )));
            }
            let Value::Object(entries) = arg else {
                return Err(DbError::invalid_update(format!(
                    "{op} requires an object of path/argument pairs, got {}",
                    arg.type_name()
                )));
            };
            if entries.is_empty() {
                return Err(DbError::invalid_update(format!("{op} has no paths")));
            }
            for (raw_path, op_arg) in entries {
                actions.push(parse_action(op, raw_path, op_arg)?);
            }
        }

        Ok(Self { actions })
    }
}

fn parse_action(op: &str, raw_path: &str, arg: &Value) -> DbResult<UpdateAction> {
    let path =
        FieldPath::parse(raw_path).map_err(|e| DbError::invalid_update(e.to_string()))?;

    // `_id` is immutable. The only thing allowed to target it is a $set,
    // and only with the value already stored (verified at apply time).
    if path.root() == "_id" && (op != "$set" || !path.is_top_level("_id")) {
        return Err(DbError::immutable_field(raw_path));
    }

    match op {
        "$set" => Ok(UpdateAction::Set {
            path,
            value: arg.clone(),
        }),
        "$unset" => Ok(UpdateAction::Unset { path }),
        "$inc" => Ok(UpdateAction::Inc {
            path,
            amount: numeric_arg(op, arg)?,
        }),
        "$mul" => Ok(UpdateAction::Mul {
            path,
            factor: numeric_arg(op, arg)?,
        }),
        "$min" => Ok(UpdateAction::Min {
            path,
            value: arg.clone(),
        }),
        "$max" => Ok(UpdateAction::Max {
            path,
            value: arg.clone(),
        }),
        "$push" => Ok(UpdateAction::Push {
            path,
            items: array_items(op, arg)?,
        }),
        "$addToSet" => Ok(UpdateAction::AddToSet {
            path,
            items: array_items(op, arg)?,
        }),
        "$pull" => Ok(UpdateAction::Pull {
            path,
            condition: pull_condition(arg)?,
        }),
        other => Err(DbError::invalid_update(format!(
            "unknown update operator {other}"
        ))),
    }
}

fn numeric_arg(op: &str, arg: &Value) -> DbResult<f64> {
    match arg {
        Value::Number(n) if n.is_finite() => Ok(*n),
        Value::Number(_) => Err(DbError::invalid_update(format!(
            "{op} requires a finite number"
        ))),
        other => Err(DbError::invalid_update(format!(
            "{op} requires a number, got {}",
            other.type_name()
        ))),
    }
}

/// Splits a `$push`/`$addToSet` argument into the items to append.
///
/// `{"$each": [...]}` appends several; any other `$`-modifier is
/// rejected; a plain value appends itself.
fn array_items(op: &str, arg: &Value) -> DbResult<Vec<Value>> {
    if let Value::Object(pairs) = arg {
        if pairs.iter().any(|(k, _)| k.starts_with('$')) {
            if let Some(stray) = pairs.iter().find(|(k, _)| k != "$each") {
                return Err(DbError::invalid_update(format!(
                    "unknown {op} modifier {:?}",
                    stray.0
                )));
            }
            let Some(Value::Array(items)) = arg.get("$each") else {
                return Err(DbError::invalid_update(format!(
                    "{op} $each requires an array"
                )));
            };
            return Ok(items.clone());
        }
    }
    Ok(vec![arg.clone()])
}

fn pull_condition(arg: &Value) -> DbResult<PullCondition> {
    let Value::Object(pairs) = arg else {
        return Ok(PullCondition::Equals(arg.clone()));
    };

    let operator_keys = pairs.iter().filter(|(k, _)| k.starts_with('$')).count();
    if operator_keys == 0 {
        // A plain object is a sub-filter over object elements.
        let filter = Filter::compile(arg)
            .map_err(|e| DbError::invalid_update(format!("$pull sub-filter: {e}")))?;
        return Ok(PullCondition::Filter(filter));
    }
    if operator_keys != pairs.len() {
        return Err(DbError::invalid_update(
            "$pull cannot mix operators and plain keys in one condition",
        ));
    }

    let mut predicates = Vec::with_capacity(pairs.len());
    for (op, op_arg) in pairs {
        let predicate = compile_predicate(op, op_arg)
            .map_err(|e| DbError::invalid_update(format!("$pull condition: {e}")))?;
        predicates.push(predicate);
    }
    Ok(PullCondition::Operators(predicates))
}
