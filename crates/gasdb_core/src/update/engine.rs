//! Applying update expressions to documents.

use crate::error::{DbError, DbResult};
use crate::update::expr::{UpdateAction, UpdateExpr};
use gasdb_codec::Value;
use std::cmp::Ordering;

/// Applies update expressions to documents, immutably.
///
/// The input document is never mutated: the engine works on a fresh
/// deep copy and returns it only when every action succeeded, so a
/// failing sub-operation leaves the caller's document untouched.
#[derive(Debug)]
pub struct UpdateEngine;

impl UpdateEngine {
    /// Parses `update` and applies it to `doc`, returning the new
    /// document.
    ///
    /// # Errors
    ///
    /// Propagates parse failures (see [`UpdateExpr::parse`]) and
    /// application failures such as type mismatches (`$inc` on a
    /// string), out-of-range array writes, or an attempt to change
    /// `_id`.
    pub fn apply(doc: &Value, update: &Value) -> DbResult<Value> {
        let expr = UpdateExpr::parse(update)?;
        Self::apply_expr(doc, &expr)
    }

    /// Applies an already-parsed expression to `doc`.
    ///
    /// # Errors
    ///
    /// Same application failures as [`UpdateEngine::apply`].
    pub fn apply_expr(doc: &Value, expr: &UpdateExpr) -> DbResult<Value> {
        if !doc.is_object() {
            return Err(DbError::invalid_argument(format!(
                "can only update an object document, got {}",
                doc.type_name()
            )));
        }

        let mut out = doc.clone();
        for action in &expr.actions {
            apply_action(&mut out, action)?;
        }
        Ok(out)
    }
}

fn apply_action(doc: &mut Value, action: &UpdateAction) -> DbResult<()> {
    match action {
        UpdateAction::Set { path, value } => {
            if path.is_top_level("_id") {
                // Re-asserting the stored _id is a no-op; anything else
                // would change it.
                return match doc.get("_id") {
                    Some(current) if current.deep_eq(value) => Ok(()),
                    _ => Err(DbError::immutable_field("_id")),
                };
            }
            path.set(doc, value.clone())
        }
        UpdateAction::Unset { path } => {
            path.unset(doc)?;
            Ok(())
        }
        UpdateAction::Inc { path, amount } => {
            let base = numeric_base(doc, path, "$inc")?;
            path.set(doc, Value::Number(base + amount))
        }
        UpdateAction::Mul { path, factor } => {
            let base = numeric_base(doc, path, "$mul")?;
            path.set(doc, Value::Number(base * factor))
        }
        UpdateAction::Min { path, value } => {
            let replace = match path.resolve_for_write(doc) {
                None => true,
                Some(current) => value.compare(current) == Some(Ordering::Less),
            };
            if replace {
                path.set(doc, value.clone())?;
            }
            Ok(())
        }
        UpdateAction::Max { path, value } => {
            let replace = match path.resolve_for_write(doc) {
                None => true,
                Some(current) => value.compare(current) == Some(Ordering::Greater),
            };
            if replace {
                path.set(doc, value.clone())?;
            }
            Ok(())
        }
        UpdateAction::Push { path, items } => {
            let mut array = existing_array(doc, path, "$push")?.unwrap_or_default();
            array.extend(items.iter().cloned());
            path.set(doc, Value::Array(array))
        }
        UpdateAction::AddToSet { path, items } => {
            let mut array = existing_array(doc, path, "$addToSet")?.unwrap_or_default();
            for item in items {
                if !array.iter().any(|existing| existing.deep_eq(item)) {
                    array.push(item.clone());
                }
            }
            path.set(doc, Value::Array(array))
        }
        UpdateAction::Pull { path, condition } => {
            let Some(array) = existing_array(doc, path, "$pull")? else {
                return Ok(());
            };
            let retained: Vec<Value> = array
                .into_iter()
                .filter(|element| !condition.matches(element))
                .collect();
            path.set(doc, Value::Array(retained))
        }
    }
}

fn numeric_base(doc: &Value, path: &crate::document::FieldPath, op: &str) -> DbResult<f64> {
    match path.resolve_for_write(doc) {
        None => Ok(0.0),
        Some(Value::Number(n)) => Ok(*n),
        Some(other) => Err(DbError::invalid_update(format!(
            "{op} requires a number at {:?}, found {}",
            path.raw(),
            other.type_name()
        ))),
    }
}

fn existing_array(
    doc: &Value,
    path: &crate::document::FieldPath,
    op: &str,
) -> DbResult<Option<Vec<Value>>> {
    match path.resolve_for_write(doc) {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items.clone())),
        Some(other) => Err(DbError::invalid_update(format!(
            "{op} requires an array at {:?}, found {}",
            path.raw(),
            other.type_name()
        ))),
    }
}
