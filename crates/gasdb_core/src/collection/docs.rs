//! Per-collection in-memory document map.

use crate::document::validate_document;
use crate::error::{DbError, DbResult};
use crate::query::Filter;
use crate::update::{UpdateEngine, UpdateExpr};
use gasdb_codec::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Result of an operator update against one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Whether a document with the target id existed.
    pub matched: bool,
    /// Whether the update produced a structurally different document.
    pub modified: bool,
}

/// The in-memory documents of one collection.
///
/// Keys are document `_id`s; iteration order is deterministic
/// (`BTreeMap`), so query results are stable across runs.
///
/// The store enforces the document invariants on every write path: a
/// document's `_id` always equals its map key, and stored documents
/// never contain operator-shaped keys or non-finite numbers.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    docs: BTreeMap<String, Value>,
}

impl DocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a persisted documents map.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when an entry's `_id` does not equal its map
    /// key - stored state is written by this engine and must uphold
    /// the invariant.
    pub fn from_documents(docs: BTreeMap<String, Value>) -> DbResult<Self> {
        for (key, doc) in &docs {
            let id = doc.get("_id").and_then(Value::as_str);
            if id != Some(key.as_str()) {
                return Err(DbError::internal(format!(
                    "stored document under key {key:?} carries _id {id:?}"
                )));
            }
        }
        Ok(Self { docs })
    }

    /// Returns the number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True when the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Looks up a document by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.docs.get(id)
    }

    /// Iterates over all documents in key order.
    pub fn documents(&self) -> impl Iterator<Item = &Value> {
        self.docs.values()
    }

    /// Borrows the underlying map for serialisation.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.docs
    }

    /// Inserts a document, assigning a fresh `_id` when absent.
    ///
    /// Returns the id under which the document was stored.
    ///
    /// # Errors
    ///
    /// - `InvalidDocument` for shape violations (see
    ///   [`validate_document`]).
    /// - `DuplicateKey` when the `_id` is already taken.
    pub fn insert(&mut self, mut doc: Value) -> DbResult<String> {
        validate_document(&doc)?;

        let id = match doc.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                if let Value::Object(pairs) = &mut doc {
                    pairs.insert(0, ("_id".to_string(), Value::from(id.clone())));
                }
                id
            }
        };

        if self.docs.contains_key(&id) {
            return Err(DbError::duplicate_key(id));
        }
        self.docs.insert(id.clone(), doc);
        Ok(id)
    }

    /// Returns the first document matching a compiled filter.
    #[must_use]
    pub fn find_first(&self, filter: &Filter) -> Option<&Value> {
        self.documents().find(|doc| filter.matches(doc))
    }

    /// Returns every document matching a compiled filter.
    #[must_use]
    pub fn find_all(&self, filter: &Filter) -> Vec<&Value> {
        self.documents().filter(|doc| filter.matches(doc)).collect()
    }

    /// Counts the documents matching a compiled filter.
    #[must_use]
    pub fn count(&self, filter: &Filter) -> usize {
        self.documents().filter(|doc| filter.matches(doc)).count()
    }

    /// Replaces the document stored under `id`, preserving its `_id`.
    ///
    /// The replacement's own `_id`, when present, must equal `id`.
    /// Returns whether the stored document actually changed.
    ///
    /// # Errors
    ///
    /// - `NotFound` when no document is stored under `id`.
    /// - `InvalidArgument` when the replacement carries a different
    ///   `_id`.
    /// - `InvalidDocument` for shape violations.
    pub fn replace_by_id(&mut self, id: &str, mut replacement: Value) -> DbResult<bool> {
        let Some(current) = self.docs.get(id) else {
            return Err(DbError::not_found(format!("document {id:?}")));
        };
        match replacement.get("_id").and_then(Value::as_str) {
            Some(own) if own != id => {
                return Err(DbError::invalid_argument(format!(
                    "replacement _id {own:?} does not match target {id:?}"
                )));
            }
            Some(_) => {}
            None => {
                if let Value::Object(pairs) = &mut replacement {
                    pairs.insert(0, ("_id".to_string(), Value::from(id)));
                }
            }
        }
        validate_document(&replacement)?;

        let modified = !replacement.deep_eq(current);
        if modified {
            self.docs.insert(id.to_string(), replacement);
        }
        Ok(modified)
    }

    /// Applies a parsed update expression to the document under `id`.
    ///
    /// `modified` is false when the resulting document is structurally
    /// equal to the prior one; the stored entry is only swapped on a
    /// real change.
    ///
    /// # Errors
    ///
    /// Propagates update-application failures; the stored document is
    /// unchanged on error.
    pub fn update_by_id(&mut self, id: &str, expr: &UpdateExpr) -> DbResult<UpdateOutcome> {
        let Some(current) = self.docs.get(id) else {
            return Ok(UpdateOutcome {
                matched: false,
                modified: false,
            });
        };

        let updated = UpdateEngine::apply_expr(current, expr)?;
        validate_document(&updated)?;

        let modified = !updated.deep_eq(current);
        if modified {
            self.docs.insert(id.to_string(), updated);
        }
        Ok(UpdateOutcome {
            matched: true,
            modified,
        })
    }

    /// Removes the document under `id`, returning it.
    pub fn remove(&mut self, id: &str) -> Option<Value> {
        self.docs.remove(id)
    }

    /// Removes every document matching a compiled filter.
    ///
    /// Returns the number removed.
    pub fn delete_by_filter(&mut self, filter: &Filter) -> usize {
        let doomed: Vec<String> = self
            .docs
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            self.docs.remove(id);
        }
        doomed.len()
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

    fn filter(json: serde_json::Value) -> Filter {
        Filter::compile(&v(json)).unwrap()
    }

    #[test]
    fn insert_assigns_uuid_when_id_absent() {
        let mut store = DocumentStore::new();
        let id = store.insert(v(json!({"name": "Anna"}))).unwrap();

        assert!(Uuid::parse_str(&id).is_ok());
        let doc = store.get(&id).unwrap();
        assert_eq!(doc.get("_id").and_then(Value::as_str), Some(id.as_str()));
    }

    #[test]
    fn insert_keeps_provided_id() {
        let mut store = DocumentStore::new();
        let id = store.insert(v(json!({"_id": "a", "n": 1}))).unwrap();
        assert_eq!(id, "a");
    }

    #[test]
    fn duplicate_insert_rejected_and_count_stays_one() {
        let mut store = DocumentStore::new();
        store.insert(v(json!({"_id": "a"}))).unwrap();

        let second = store.insert(v(json!({"_id": "a"})));
        assert!(matches!(second, Err(DbError::DuplicateKey { .. })));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn insert_rejects_operator_keys() {
        let mut store = DocumentStore::new();
        let result = store.insert(v(json!({"_id": "a", "bad": {"$gt": 1}})));
        assert!(matches!(result, Err(DbError::InvalidDocument { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn find_by_filter() {
        let mut store = DocumentStore::new();
        store.insert(v(json!({"_id": "a", "age": 30}))).unwrap();
        store.insert(v(json!({"_id": "b", "age": 20}))).unwrap();

        let adults = store.find_all(&filter(json!({"age": {"$gte": 25}})));
        assert_eq!(adults.len(), 1);
        assert_eq!(adults[0].get("_id").and_then(Value::as_str), Some("a"));

        assert_eq!(store.count(&filter(json!({}))), 2);
        assert!(store
            .find_first(&filter(json!({"age": {"$lt": 25}})))
            .is_some());
    }

    #[test]
    fn replace_preserves_id() {
        let mut store = DocumentStore::new();
        store.insert(v(json!({"_id": "a", "n": 1}))).unwrap();

        store.replace_by_id("a", v(json!({"n": 2}))).unwrap();
        let doc = store.get("a").unwrap();
        assert_eq!(doc.get("_id").and_then(Value::as_str), Some("a"));
        assert_eq!(doc.get("n").and_then(Value::as_f64), Some(2.0));
    }

    #[test]
    fn replace_with_identical_content_is_not_modified() {
        let mut store = DocumentStore::new();
        store.insert(v(json!({"_id": "a", "n": 1}))).unwrap();

        assert!(!store.replace_by_id("a", v(json!({"n": 1}))).unwrap());
        assert!(store.replace_by_id("a", v(json!({"n": 2}))).unwrap());
    }

    #[test]
    fn replace_rejects_mismatched_id() {
        let mut store = DocumentStore::new();
        store.insert(v(json!({"_id": "a"}))).unwrap();

        let result = store.replace_by_id("a", v(json!({"_id": "b"})));
        assert!(matches!(result, Err(DbError::InvalidArgument { .. })));
    }

    #[test]
    fn replace_missing_is_not_found() {
        let mut store = DocumentStore::new();
        let result = store.replace_by_id("ghost", v(json!({"n": 1})));
        assert!(matches!(result, Err(DbError::NotFound { .. })));
    }

    #[test]
    fn update_reports_matched_and_modified() {
        let mut store = DocumentStore::new();
        store.insert(v(json!({"_id": "a", "n": 1}))).unwrap();

        let expr = UpdateExpr::parse(&v(json!({"$inc": {"n": 1}}))).unwrap();
        let outcome = store.update_by_id("a", &expr).unwrap();
        assert!(outcome.matched);
        assert!(outcome.modified);
        assert_eq!(
            store.get("a").unwrap().get("n").and_then(Value::as_f64),
            Some(2.0)
        );
    }

    #[test]
    fn update_without_change_is_not_modified() {
        let mut store = DocumentStore::new();
        store.insert(v(json!({"_id": "a", "n": 5}))).unwrap();

        // $max with a smaller argument leaves the document as-is.
        let expr = UpdateExpr::parse(&v(json!({"$max": {"n": 1}}))).unwrap();
        let outcome = store.update_by_id("a", &expr).unwrap();
        assert!(outcome.matched);
        assert!(!outcome.modified);
    }

    #[test]
    fn update_missing_id_matches_nothing() {
        let mut store = DocumentStore::new();
        let expr = UpdateExpr::parse(&v(json!({"$set": {"a": 1}}))).unwrap();
        let outcome = store.update_by_id("ghost", &expr).unwrap();
        assert!(!outcome.matched);
        assert!(!outcome.modified);
    }

    #[test]
    fn failed_update_leaves_document_unchanged() {
        let mut store = DocumentStore::new();
        store.insert(v(json!({"_id": "a", "s": "text"}))).unwrap();

        let expr = UpdateExpr::parse(&v(json!({"$inc": {"s": 1}}))).unwrap();
        assert!(store.update_by_id("a", &expr).is_err());
        assert_eq!(
            store.get("a").unwrap().get("s").and_then(Value::as_str),
            Some("text")
        );
    }

    #[test]
    fn delete_by_id_and_filter() {
        let mut store = DocumentStore::new();
        for i in 0..4 {
            store
                .insert(v(json!({"_id": format!("d{i}"), "even": i % 2 == 0})))
                .unwrap();
        }

        assert!(store.remove("d0").is_some());
        assert!(store.remove("d0").is_none());

        let removed = store.delete_by_filter(&filter(json!({"even": false})));
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.count(&filter(json!({"even": false}))), 0);
    }

    #[test]
    fn from_documents_verifies_id_invariant() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), v(json!({"_id": "a"})));
        assert!(DocumentStore::from_documents(map).is_ok());

        let mut bad = BTreeMap::new();
        bad.insert("a".to_string(), v(json!({"_id": "b"})));
        assert!(matches!(
            DocumentStore::from_documents(bad),
            Err(DbError::Internal { .. })
        ));
    }
}
