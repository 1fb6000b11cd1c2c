//! Database facade and driver wiring.

use crate::collection::Collection;
use crate::config::DbConfig;
use crate::error::{DbError, DbResult};
use crate::file_service::FileService;
use crate::lock_service::LockService;
use crate::master_index::MasterIndex;
use gasdb_storage::{BlobStore, MemoryBlobStore, MemoryPropertyStore, PropertyStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Everything the collections share: drivers behind their services,
/// the master index, and the open flag.
pub(crate) struct Services {
    pub(crate) config: DbConfig,
    pub(crate) files: FileService,
    pub(crate) locks: LockService,
    pub(crate) index: Arc<MasterIndex>,
    open: AtomicBool,
}

impl Services {
    pub(crate) fn ensure_open(&self) -> DbResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DbError::invalid_argument("database is closed"))
        }
    }
}

/// The main database handle.
///
/// `Database` wires the injected drivers into the engine and hands out
/// [`Collection`] handles. Collections are created lazily on first
/// access and share one in-memory state per name.
///
/// # Opening a Database
///
/// ```rust
/// use gasdb_core::{Database, DbConfig};
/// use gasdb_storage::{MemoryBlobStore, MemoryPropertyStore};
/// use std::sync::Arc;
///
/// let db = Database::new(
///     DbConfig::default(),
///     Arc::new(MemoryBlobStore::new()),
///     Arc::new(MemoryPropertyStore::new()),
/// );
/// let users = db.collection("users").unwrap();
/// ```
///
/// For tests and ephemeral use, [`Database::open_in_memory`] wires the
/// in-memory drivers for you.
pub struct Database {
    services: Arc<Services>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    /// Opens a database over injected drivers.
    pub fn new(
        config: DbConfig,
        blobs: Arc<dyn BlobStore>,
        props: Arc<dyn PropertyStore>,
    ) -> Self {
        let index = Arc::new(MasterIndex::new(
            Arc::clone(&props),
            config.master_index_key.clone(),
        ));
        let files = FileService::new(blobs, config.file_service_config());
        let locks = LockService::new(props, Arc::clone(&index));

        Self {
            services: Arc::new(Services {
                config,
                files,
                locks,
                index,
                open: AtomicBool::new(true),
            }),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a fresh database over in-memory drivers.
    ///
    /// Data is lost when the handle is dropped.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::new(
            DbConfig::default(),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(MemoryPropertyStore::new()),
        )
    }

    /// Creates (registers) a collection and returns its handle.
    ///
    /// The registration is persisted to the master index immediately;
    /// creating an already-registered collection just returns its
    /// handle.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty name, plus lock/backend failures.
    pub fn create_collection(&self, name: &str) -> DbResult<Arc<Collection>> {
        self.services.ensure_open()?;
        validate_collection_name(name)?;

        let collection = self.handle(name);
        collection.ensure_registered()?;
        Ok(collection)
    }

    /// Returns a handle to a collection, creating it lazily on first
    /// operation.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty name or a closed database.
    pub fn collection(&self, name: &str) -> DbResult<Arc<Collection>> {
        self.services.ensure_open()?;
        validate_collection_name(name)?;
        Ok(self.handle(name))
    }

    /// Lists the collections registered in the master index.
    ///
    /// # Errors
    ///
    /// Lock/backend failures.
    pub fn list_collections(&self) -> DbResult<Vec<String>> {
        self.services.ensure_open()?;
        let _guard = self
            .services
            .locks
            .acquire(self.services.config.lock_timeout)?;
        self.services.index.list_collections()
    }

    /// Drops a collection: deletes its blob and unregisters it.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such collection is registered, plus
    /// lock/backend failures.
    pub fn drop_collection(&self, name: &str) -> DbResult<()> {
        self.services.ensure_open()?;
        validate_collection_name(name)?;

        let _guard = self
            .services
            .locks
            .acquire(self.services.config.lock_timeout)?;
        let Some(meta) = self.services.index.get_collection(name)? else {
            return Err(DbError::not_found(format!("collection {name:?}")));
        };

        if let Some(handle) = &meta.file_handle {
            match self.services.files.delete(handle) {
                // The registry entry is authoritative; a blob already
                // gone is not an error.
                Ok(()) | Err(DbError::BackendUnavailable { .. }) => {}
                Err(other) => return Err(other),
            }
        }
        self.services.index.remove_collection(name)?;
        self.collections.write().remove(name);
        info!(collection = name, "dropped collection");
        Ok(())
    }

    /// Persists every dirty collection and closes the handle.
    ///
    /// Subsequent operations fail. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Lock/backend failures while saving.
    pub fn close(&self) -> DbResult<()> {
        if !self.services.open.load(Ordering::Acquire) {
            return Ok(());
        }
        let handles: Vec<Arc<Collection>> =
            self.collections.read().values().cloned().collect();
        for collection in handles {
            collection.save()?;
        }
        self.services.open.store(false, Ordering::Release);
        Ok(())
    }

    /// Whether the handle is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.services.open.load(Ordering::Acquire)
    }

    /// The lock service, for advisory per-collection locking.
    #[must_use]
    pub fn locks(&self) -> &LockService {
        &self.services.locks
    }

    /// The master index, for conflict inspection and resolution.
    #[must_use]
    pub fn master_index(&self) -> &MasterIndex {
        &self.services.index
    }

    fn handle(&self, name: &str) -> Arc<Collection> {
        if let Some(existing) = self.collections.read().get(name) {
            return Arc::clone(existing);
        }
        let mut map = self.collections.write();
        Arc::clone(map.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Collection::new(
                name.to_string(),
                Arc::clone(&self.services),
            ))
        }))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Best-effort flush of deferred state.
        let _ = self.close();
    }
}

fn validate_collection_name(name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::invalid_argument("collection name is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasdb_codec::from_json;
    use gasdb_codec::Value;
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        from_json(&json).unwrap()
    }

    #[test]
    fn open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_open());
    }

    #[test]
    fn collection_handles_are_shared_per_name() {
        let db = Database::open_in_memory();
        let a = db.collection("users").unwrap();
        let b = db.collection("users").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn create_collection_registers_immediately() {
        let db = Database::open_in_memory();
        db.create_collection("users").unwrap();
        assert_eq!(db.list_collections().unwrap(), vec!["users"]);

        // Idempotent.
        db.create_collection("users").unwrap();
        assert_eq!(db.list_collections().unwrap().len(), 1);
    }

    #[test]
    fn lazy_collection_registers_on_first_write() {
        let db = Database::open_in_memory();
        let users = db.collection("users").unwrap();
        assert!(db.list_collections().unwrap().is_empty());

        users.insert_one(v(json!({"_id": "a"}))).unwrap();
        assert_eq!(db.list_collections().unwrap(), vec!["users"]);
    }

    #[test]
    fn empty_collection_name_rejected() {
        let db = Database::open_in_memory();
        assert!(matches!(
            db.collection(""),
            Err(DbError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn drop_collection_removes_registration() {
        let db = Database::open_in_memory();
        let users = db.create_collection("users").unwrap();
        users.insert_one(v(json!({"_id": "a"}))).unwrap();

        db.drop_collection("users").unwrap();
        assert!(db.list_collections().unwrap().is_empty());

        // A fresh handle starts empty.
        let users = db.collection("users").unwrap();
        assert_eq!(users.count_documents(&v(json!({}))).unwrap(), 0);
    }

    #[test]
    fn drop_unknown_collection_is_not_found() {
        let db = Database::open_in_memory();
        assert!(matches!(
            db.drop_collection("ghost"),
            Err(DbError::NotFound { .. })
        ));
    }

    #[test]
    fn close_rejects_further_operations() {
        let db = Database::open_in_memory();
        let users = db.collection("users").unwrap();
        users.insert_one(v(json!({"_id": "a"}))).unwrap();

        db.close().unwrap();
        assert!(!db.is_open());
        assert!(db.collection("users").is_err());
        assert!(users.find(&v(json!({}))).is_err());

        // Closing twice is harmless.
        db.close().unwrap();
    }
}
