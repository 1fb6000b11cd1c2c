//! Collections: the public MongoDB-style API surface.

mod docs;
pub(crate) mod metadata;
mod results;

pub use docs::{DocumentStore, UpdateOutcome};
pub use metadata::CollectionMetadata;
pub use results::{DeleteResult, InsertOneResult, UpdateResult};

use crate::database::Services;
use crate::document::validate_document;
use crate::error::{DbError, DbResult};
use crate::query::Filter;
use crate::update::UpdateExpr;
use gasdb_codec::Value;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A named set of documents persisted as one blob.
///
/// Handles are cheap to clone through the owning
/// [`Database`](crate::Database) and share one state per name. The
/// blob is loaded lazily on the first operation; every mutation runs
/// under the process-wide lock, persists the blob as one unit, and
/// publishes fresh metadata to the master index.
///
/// Every mutation is computed on a copy of the in-memory documents and
/// only swapped in once the blob write and the index publish succeed,
/// so a backend failure leaves both memory and the caller's view at
/// the prior state.
pub struct Collection {
    name: String,
    services: Arc<Services>,
    state: Mutex<CollectionState>,
}

struct CollectionState {
    loaded: bool,
    dirty: bool,
    docs: DocumentStore,
    meta: CollectionMetadata,
}

impl Collection {
    pub(crate) fn new(name: String, services: Arc<Services>) -> Self {
        let meta = CollectionMetadata::new(&name);
        Self {
            name,
            services,
            state: Mutex::new(CollectionState {
                loaded: false,
                dirty: false,
                docs: DocumentStore::new(),
                meta,
            }),
        }
    }

    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts a document, assigning a fresh `_id` when absent.
    ///
    /// # Errors
    ///
    /// `InvalidDocument` for shape violations, `DuplicateKey` on an
    /// `_id` collision, plus lock/backend failures.
    pub fn insert_one(&self, doc: Value) -> DbResult<InsertOneResult> {
        validate_document(&doc)?;
        self.write_op(|docs| {
            let inserted_id = docs.insert(doc)?;
            Ok((inserted_id, true))
        })
        .map(|inserted_id| InsertOneResult {
            inserted_id,
            acknowledged: true,
        })
    }

    /// Returns every document matching the filter.
    ///
    /// Documents cross the API boundary by copy.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for a malformed filter, plus lock/backend
    /// failures.
    pub fn find(&self, filter: &Value) -> DbResult<Vec<Value>> {
        if let Some(id) = id_fast_path(filter) {
            let id = id.to_string();
            return self.read_op(|docs| Ok(docs.get(&id).cloned().into_iter().collect()));
        }
        let compiled = Filter::compile(filter)?;
        self.read_op(|docs| Ok(docs.find_all(&compiled).into_iter().cloned().collect()))
    }

    /// Returns the first document matching the filter.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for a malformed filter, plus lock/backend
    /// failures.
    pub fn find_one(&self, filter: &Value) -> DbResult<Option<Value>> {
        if let Some(id) = id_fast_path(filter) {
            let id = id.to_string();
            return self.read_op(|docs| Ok(docs.get(&id).cloned()));
        }
        let compiled = Filter::compile(filter)?;
        self.read_op(|docs| Ok(docs.find_first(&compiled).cloned()))
    }

    /// Counts the documents matching the filter.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for a malformed filter, plus lock/backend
    /// failures.
    pub fn count_documents(&self, filter: &Value) -> DbResult<u64> {
        if let Some(id) = id_fast_path(filter) {
            let id = id.to_string();
            return self.read_op(|docs| Ok(u64::from(docs.get(&id).is_some())));
        }
        let compiled = Filter::compile(filter)?;
        self.read_op(|docs| Ok(docs.count(&compiled) as u64))
    }

    /// Applies an update expression to the first matching document.
    ///
    /// # Errors
    ///
    /// `InvalidQuery`/`InvalidUpdate` for malformed inputs,
    /// `ImmutableField` for `_id` tampering, plus lock/backend
    /// failures.
    pub fn update_one(&self, filter: &Value, update: &Value) -> DbResult<UpdateResult> {
        let expr = UpdateExpr::parse(update)?;
        let target = self.target_selector(filter)?;
        self.write_op(move |docs| {
            let Some(id) = target.first_id(docs) else {
                return Ok((unmatched_update(), false));
            };
            let outcome = docs.update_by_id(&id, &expr)?;
            let result = UpdateResult {
                matched_count: u64::from(outcome.matched),
                modified_count: u64::from(outcome.modified),
                acknowledged: true,
            };
            Ok((result, outcome.modified))
        })
    }

    /// Applies an update expression to every matching document.
    ///
    /// # Errors
    ///
    /// Same as [`Collection::update_one`].
    pub fn update_many(&self, filter: &Value, update: &Value) -> DbResult<UpdateResult> {
        let expr = UpdateExpr::parse(update)?;
        let target = self.target_selector(filter)?;
        self.write_op(move |docs| {
            let ids = target.all_ids(docs);
            let mut modified = 0u64;
            for id in &ids {
                let outcome = docs.update_by_id(id, &expr)?;
                modified += u64::from(outcome.modified);
            }
            let result = UpdateResult {
                matched_count: ids.len() as u64,
                modified_count: modified,
                acknowledged: true,
            };
            Ok((result, modified > 0))
        })
    }

    /// Replaces the first matching document wholesale, preserving its
    /// `_id`.
    ///
    /// # Errors
    ///
    /// `InvalidDocument`/`InvalidArgument` for a bad replacement,
    /// `InvalidQuery` for a malformed filter, plus lock/backend
    /// failures.
    pub fn replace_one(&self, filter: &Value, replacement: Value) -> DbResult<UpdateResult> {
        if replacement
            .as_object()
            .is_some_and(|pairs| pairs.iter().any(|(k, _)| k.starts_with('$')))
        {
            return Err(DbError::invalid_argument(
                "replacement must be a plain document, not an update expression",
            ));
        }
        validate_document(&replacement)?;
        let target = self.target_selector(filter)?;
        self.write_op(move |docs| {
            let Some(id) = target.first_id(docs) else {
                return Ok((unmatched_update(), false));
            };
            let modified = docs.replace_by_id(&id, replacement)?;
            let result = UpdateResult {
                matched_count: 1,
                modified_count: u64::from(modified),
                acknowledged: true,
            };
            Ok((result, modified))
        })
    }

    /// Deletes the first matching document.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for a malformed filter, plus lock/backend
    /// failures.
    pub fn delete_one(&self, filter: &Value) -> DbResult<DeleteResult> {
        let target = self.target_selector(filter)?;
        self.write_op(move |docs| {
            let Some(id) = target.first_id(docs) else {
                return Ok((
                    DeleteResult {
                        deleted_count: 0,
                        acknowledged: true,
                    },
                    false,
                ));
            };
            docs.remove(&id);
            Ok((
                DeleteResult {
                    deleted_count: 1,
                    acknowledged: true,
                },
                true,
            ))
        })
    }

    /// Deletes every matching document.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for a malformed filter, plus lock/backend
    /// failures.
    pub fn delete_many(&self, filter: &Value) -> DbResult<DeleteResult> {
        let target = self.target_selector(filter)?;
        self.write_op(move |docs| {
            let deleted = match &target {
                Target::Id(id) => usize::from(docs.remove(id).is_some()),
                Target::Query(compiled) => docs.delete_by_filter(compiled),
            };
            Ok((
                DeleteResult {
                    deleted_count: deleted as u64,
                    acknowledged: true,
                },
                deleted > 0,
            ))
        })
    }

    /// Returns a snapshot of the collection's metadata.
    ///
    /// # Errors
    ///
    /// Lock/backend failures while lazily loading.
    pub fn metadata(&self) -> DbResult<CollectionMetadata> {
        self.read_op_with_state(|_, state| Ok(state.meta.clone()))
    }

    /// Whether in-memory state is ahead of the persisted blob.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Persists the collection when dirty; a clean collection is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Lock/backend failures.
    pub fn save(&self) -> DbResult<()> {
        self.services.ensure_open()?;
        let _guard = self.services.locks.acquire(self.services.config.lock_timeout)?;
        let mut state = self.state.lock();
        if !state.loaded || !state.dirty {
            return Ok(());
        }

        let expected = state.meta.modification_token.clone();
        let mut meta = state.meta.clone();
        meta.bump(state.docs.len() as u64);
        self.persist_blob(&state.docs, &mut meta)?;
        self.services.index.publish(&meta, &expected)?;
        state.meta = meta;
        state.dirty = false;
        Ok(())
    }

    /// Registers this collection in the master index when absent,
    /// publishing the handle's own metadata so later token checks line
    /// up.
    pub(crate) fn ensure_registered(&self) -> DbResult<()> {
        self.services.ensure_open()?;
        let _guard = self.services.locks.acquire(self.services.config.lock_timeout)?;
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;
        if self.services.index.get_collection(&self.name)?.is_none() {
            self.services.index.add_collection(&state.meta)?;
            debug!(collection = %self.name, "registered collection");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Orchestration
    // ------------------------------------------------------------------

    /// Runs a read under the process-wide lock with the blob loaded.
    fn read_op<R>(&self, f: impl FnOnce(&DocumentStore) -> DbResult<R>) -> DbResult<R> {
        self.read_op_with_state(|docs, _| f(docs))
    }

    fn read_op_with_state<R>(
        &self,
        f: impl FnOnce(&DocumentStore, &CollectionState) -> DbResult<R>,
    ) -> DbResult<R> {
        self.services.ensure_open()?;
        let _guard = self.services.locks.acquire(self.services.config.lock_timeout)?;
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;
        f(&state.docs, &state)
    }

    /// Runs a mutation under the process-wide lock.
    ///
    /// The closure works on a copy of the documents and reports whether
    /// it changed anything. On change the copy is persisted, published,
    /// and only then swapped in; on any failure the prior in-memory
    /// state stands untouched.
    fn write_op<R>(
        &self,
        change: impl FnOnce(&mut DocumentStore) -> DbResult<(R, bool)>,
    ) -> DbResult<R> {
        self.services.ensure_open()?;
        let _guard = self.services.locks.acquire(self.services.config.lock_timeout)?;
        let mut state = self.state.lock();
        self.ensure_loaded(&mut state)?;

        let mut work = state.docs.clone();
        let (result, changed) = change(&mut work)?;
        if !changed {
            return Ok(result);
        }

        // Fail before touching the backend when another instance has
        // already moved the collection past our loaded state.
        let expected = state.meta.modification_token.clone();
        if let Some(stored) = self.services.index.get_collection(&self.name)? {
            if stored.modification_token != expected {
                return Err(DbError::conflict(
                    &self.name,
                    expected,
                    stored.modification_token,
                ));
            }
        }

        let mut meta = state.meta.clone();
        meta.bump(work.len() as u64);
        state.dirty = true;

        let persisted = self
            .persist_blob(&work, &mut meta)
            .and_then(|()| self.services.index.publish(&meta, &expected));
        match persisted {
            Ok(()) => {
                state.docs = work;
                state.meta = meta;
                state.dirty = false;
                Ok(result)
            }
            Err(err) => {
                // The copy is discarded: memory still mirrors the last
                // successfully persisted state.
                state.dirty = false;
                Err(err)
            }
        }
    }

    fn ensure_loaded(&self, state: &mut CollectionState) -> DbResult<()> {
        if state.loaded {
            return Ok(());
        }

        if let Some(meta) = self.services.index.get_collection(&self.name)? {
            if let Some(handle) = meta.file_handle.clone() {
                let blob = self.services.files.read(&handle)?;
                state.docs = decode_documents(&blob)?;
                debug!(
                    collection = %self.name,
                    documents = state.docs.len(),
                    "loaded collection blob"
                );
            }
            state.meta = meta;
        }
        state.loaded = true;
        Ok(())
    }

    fn persist_blob(&self, docs: &DocumentStore, meta: &mut CollectionMetadata) -> DbResult<()> {
        let blob = encode_blob(docs, meta)?;
        match meta.file_handle.clone() {
            Some(handle) => {
                self.services.files.mark_dirty(&handle);
                self.services.files.write(&handle, &blob)
            }
            None => {
                let handle = self.services.files.create(&self.name, &blob)?;
                debug!(collection = %self.name, %handle, "created collection blob");
                meta.file_handle = Some(handle);
                Ok(())
            }
        }
    }

    /// Compiles the filter, special-casing `{"_id": "<string>"}` into a
    /// direct map lookup.
    fn target_selector(&self, filter: &Value) -> DbResult<Target> {
        if let Some(id) = id_fast_path(filter) {
            return Ok(Target::Id(id.to_string()));
        }
        Ok(Target::Query(Filter::compile(filter)?))
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}

enum Target {
    Id(String),
    Query(Filter),
}

impl Target {
    fn first_id(&self, docs: &DocumentStore) -> Option<String> {
        match self {
            Target::Id(id) => docs.get(id).map(|_| id.clone()),
            Target::Query(filter) => docs
                .find_first(filter)
                .and_then(|doc| doc.get("_id"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    fn all_ids(&self, docs: &DocumentStore) -> Vec<String> {
        match self {
            Target::Id(id) => docs.get(id).map(|_| id.clone()).into_iter().collect(),
            Target::Query(filter) => docs
                .find_all(filter)
                .into_iter()
                .filter_map(|doc| doc.get("_id").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
        }
    }
}

fn unmatched_update() -> UpdateResult {
    UpdateResult {
        matched_count: 0,
        modified_count: 0,
        acknowledged: true,
    }
}

/// Recognises the `{"_id": "<string>"}` fast path.
fn id_fast_path(filter: &Value) -> Option<&str> {
    let pairs = filter.as_object()?;
    match pairs {
        [(key, Value::String(id))] if key == "_id" => Some(id.as_str()),
        _ => None,
    }
}

fn encode_blob(docs: &DocumentStore, meta: &CollectionMetadata) -> DbResult<serde_json::Value> {
    let mut documents = serde_json::Map::with_capacity(docs.len());
    for (id, doc) in docs.as_map() {
        let encoded = gasdb_codec::to_json(doc)
            .map_err(|e| DbError::internal(format!("encoding stored document {id:?}: {e}")))?;
        documents.insert(id.clone(), encoded);
    }
    Ok(serde_json::json!({
        "documents": documents,
        "metadata": meta.to_json(),
    }))
}

fn decode_documents(blob: &serde_json::Value) -> DbResult<DocumentStore> {
    let documents = blob
        .get("documents")
        .and_then(serde_json::Value::as_object)
        .ok_or_else(|| DbError::internal("collection blob has no documents map"))?;

    let mut map = BTreeMap::new();
    for (id, doc_json) in documents {
        let doc = gasdb_codec::from_json(doc_json)
            .map_err(|e| DbError::internal(format!("stored document {id:?}: {e}")))?;
        map.insert(id.clone(), doc);
    }
    DocumentStore::from_documents(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasdb_codec::from_json;
    use serde_json::json;

    #[test]
    fn id_fast_path_shape() {
        let hit = from_json(&json!({"_id": "abc"})).unwrap();
        assert_eq!(id_fast_path(&hit), Some("abc"));

        for miss in [
            json!({}),
            json!({"_id": 5}),
            json!({"_id": "a", "x": 1}),
            json!({"name": "a"}),
        ] {
            let filter = from_json(&miss).unwrap();
            assert_eq!(id_fast_path(&filter), None);
        }
    }

    #[test]
    fn blob_round_trip() {
        let mut docs = DocumentStore::new();
        docs.insert(from_json(&json!({"_id": "a", "n": 1})).unwrap())
            .unwrap();
        docs.insert(from_json(&json!({"_id": "b", "n": 2})).unwrap())
            .unwrap();
        let mut meta = CollectionMetadata::new("users");
        meta.bump(docs.len() as u64);

        let blob = encode_blob(&docs, &meta).unwrap();
        let decoded = decode_documents(&blob).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decoded
            .get("a")
            .unwrap()
            .deep_eq(&from_json(&json!({"_id": "a", "n": 1})).unwrap()));

        let meta_back = CollectionMetadata::from_json(&blob["metadata"]).unwrap();
        assert_eq!(meta_back.document_count, 2);
    }

    #[test]
    fn blob_without_documents_rejected() {
        let result = decode_documents(&json!({"wrong": true}));
        assert!(matches!(result, Err(DbError::Internal { .. })));
    }
}
