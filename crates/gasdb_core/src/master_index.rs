//! Process-wide registry of collections and advisory locks.
//!
//! The whole index lives under a single property-store key as one JSON
//! value: `{"collections": {...}, "locks": {...}, "version": n}`. Every
//! read-modify-write of that value must happen under the process-wide
//! exclusive lock; the index itself never acquires it (the store lock
//! is not reentrant), so callers - `Database`, `Collection`, and
//! `LockService` - wrap their call sites in a guard.

use crate::collection::metadata::now_ms;
use crate::collection::CollectionMetadata;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gasdb_storage::PropertyStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default property-store key holding the master index.
pub const DEFAULT_MASTER_INDEX_KEY: &str = "GASDB_MASTER_INDEX";

/// How a detected modification conflict should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// The publisher wins: overwrite the stored metadata.
    Overwrite,
    /// The caller backs off and retries.
    Abort,
    /// Reserved. Currently behaves exactly like [`ConflictStrategy::Abort`].
    Merge,
}

/// A cooperative per-collection lock entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LockEntry {
    /// Identifier of the operation holding the lock.
    pub operation_id: String,
    /// When the lock was taken.
    pub acquired_at: DateTime<Utc>,
    /// When the lock lapses. Entries at or past expiry count as absent.
    pub expires_at: DateTime<Utc>,
}

impl LockEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    fn to_json(&self) -> serde_json::Value {
        let date = |d: &DateTime<Utc>| {
            gasdb_codec::to_json(&gasdb_codec::Value::Date(*d))
                .unwrap_or(serde_json::Value::Null)
        };
        serde_json::json!({
            "operationId": self.operation_id,
            "acquiredAt": date(&self.acquired_at),
            "expiresAt": date(&self.expires_at),
        })
    }

    fn from_json(json: &serde_json::Value) -> DbResult<Self> {
        let bad = |what: &str| DbError::internal(format!("stored lock entry: {what}"));
        let operation_id = json
            .get("operationId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| bad("missing operationId"))?
            .to_string();
        let acquired_at = gasdb_codec::decode_date(
            json.get("acquiredAt")
                .ok_or_else(|| bad("missing acquiredAt"))?,
        )
        .map_err(|e| bad(&e.to_string()))?;
        let expires_at = gasdb_codec::decode_date(
            json.get("expiresAt")
                .ok_or_else(|| bad("missing expiresAt"))?,
        )
        .map_err(|e| bad(&e.to_string()))?;
        Ok(Self {
            operation_id,
            acquired_at,
            expires_at,
        })
    }
}

#[derive(Debug, Default)]
struct IndexData {
    collections: BTreeMap<String, CollectionMetadata>,
    locks: BTreeMap<String, LockEntry>,
    version: u64,
}

/// The master index: collection registry, lock table, and conflict
/// detection over a single property-store key.
pub struct MasterIndex {
    props: Arc<dyn PropertyStore>,
    key: String,
}

impl MasterIndex {
    /// Creates an index over a property-store driver.
    pub fn new(props: Arc<dyn PropertyStore>, key: impl Into<String>) -> Self {
        Self {
            props,
            key: key.into(),
        }
    }

    /// Returns the property-store key the index lives under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Generates a fresh opaque modification token.
    #[must_use]
    pub fn generate_modification_token() -> String {
        Uuid::new_v4().to_string()
    }

    /// Registers a collection. Overwrites an existing entry of the same
    /// name.
    pub fn add_collection(&self, meta: &CollectionMetadata) -> DbResult<()> {
        let mut data = self.load()?;
        data.collections.insert(meta.name.clone(), meta.clone());
        self.store(data)
    }

    /// Unregisters a collection and drops any lock entry for it.
    ///
    /// Returns whether an entry existed.
    pub fn remove_collection(&self, name: &str) -> DbResult<bool> {
        let mut data = self.load()?;
        let existed = data.collections.remove(name).is_some();
        data.locks.remove(name);
        if existed {
            self.store(data)?;
        }
        Ok(existed)
    }

    /// Looks up a collection's registered metadata.
    pub fn get_collection(&self, name: &str) -> DbResult<Option<CollectionMetadata>> {
        Ok(self.load()?.collections.get(name).cloned())
    }

    /// Lists the registered collection names.
    pub fn list_collections(&self) -> DbResult<Vec<String>> {
        Ok(self.load()?.collections.keys().cloned().collect())
    }

    /// Publishes new metadata without a conflict check.
    pub fn update_collection_metadata(&self, meta: &CollectionMetadata) -> DbResult<()> {
        self.add_collection(meta)
    }

    /// Checks whether the stored token for a collection differs from
    /// the caller's expectation. An unregistered collection never
    /// conflicts.
    pub fn has_conflict(&self, name: &str, expected_token: &str) -> DbResult<bool> {
        let data = self.load()?;
        Ok(match data.collections.get(name) {
            Some(stored) => stored.modification_token != expected_token,
            None => false,
        })
    }

    /// Publishes new metadata, failing when a concurrent writer got
    /// there first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conflict`] carrying the expected and stored
    /// tokens when they differ, so the caller can reload and retry.
    pub fn publish(&self, meta: &CollectionMetadata, expected_token: &str) -> DbResult<()> {
        let mut data = self.load()?;
        if let Some(stored) = data.collections.get(&meta.name) {
            if stored.modification_token != expected_token {
                warn!(
                    collection = %meta.name,
                    expected = %expected_token,
                    actual = %stored.modification_token,
                    "modification conflict detected"
                );
                return Err(DbError::conflict(
                    &meta.name,
                    expected_token,
                    &stored.modification_token,
                ));
            }
        }
        data.collections.insert(meta.name.clone(), meta.clone());
        self.store(data)
    }

    /// Applies a resolution strategy after a conflict.
    ///
    /// Returns whether the caller's metadata now stands: `Overwrite`
    /// publishes unconditionally; `Abort` and the reserved `Merge`
    /// leave the stored state in place.
    pub fn resolve_conflict(
        &self,
        meta: &CollectionMetadata,
        strategy: ConflictStrategy,
    ) -> DbResult<bool> {
        match strategy {
            ConflictStrategy::Overwrite => {
                self.update_collection_metadata(meta)?;
                Ok(true)
            }
            ConflictStrategy::Abort | ConflictStrategy::Merge => Ok(false),
        }
    }

    /// Attempts to take the advisory lock on a collection.
    ///
    /// Succeeds when no live entry exists or the live entry carries the
    /// same `operation_id` (the expiry is refreshed). Returns whether
    /// the lock is now held by `operation_id`.
    pub fn try_acquire_lock(
        &self,
        name: &str,
        operation_id: &str,
        ttl: Duration,
    ) -> DbResult<bool> {
        let mut data = self.load()?;
        let now = now_ms();

        if let Some(entry) = data.locks.get(name) {
            if !entry.is_expired(now) && entry.operation_id != operation_id {
                return Ok(false);
            }
        }

        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|_| DbError::invalid_argument("lock timeout out of range"))?;
        data.locks.insert(
            name.to_string(),
            LockEntry {
                operation_id: operation_id.to_string(),
                acquired_at: now,
                expires_at: now + ttl,
            },
        );
        self.store(data)?;
        debug!(collection = name, operation_id, "collection lock acquired");
        Ok(true)
    }

    /// Releases the advisory lock on a collection.
    ///
    /// Only the holder may release: the entry is removed when its
    /// `operation_id` matches. Returns whether an entry was removed.
    pub fn release_lock(&self, name: &str, operation_id: &str) -> DbResult<bool> {
        let mut data = self.load()?;
        let matches = data
            .locks
            .get(name)
            .is_some_and(|entry| entry.operation_id == operation_id);
        if matches {
            data.locks.remove(name);
            self.store(data)?;
        }
        Ok(matches)
    }

    /// Whether a live (non-expired) lock entry exists for a collection.
    pub fn is_locked(&self, name: &str) -> DbResult<bool> {
        let data = self.load()?;
        let now = now_ms();
        Ok(data
            .locks
            .get(name)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    /// Removes every expired lock entry, returning how many were
    /// reaped.
    pub fn cleanup_expired_locks(&self) -> DbResult<usize> {
        let mut data = self.load()?;
        let now = now_ms();
        let before = data.locks.len();
        data.locks.retain(|_, entry| !entry.is_expired(now));
        let reaped = before - data.locks.len();
        if reaped > 0 {
            debug!(reaped, "reaped expired collection locks");
            self.store(data)?;
        }
        Ok(reaped)
    }

    /// Returns the index version, incremented on every save.
    pub fn version(&self) -> DbResult<u64> {
        Ok(self.load()?.version)
    }

    fn load(&self) -> DbResult<IndexData> {
        let Some(text) = self.props.get(&self.key)? else {
            return Ok(IndexData::default());
        };
        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| DbError::internal(format!("master index corrupted: {e}")))?;

        let mut data = IndexData {
            version: json
                .get("version")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0),
            ..IndexData::default()
        };
        if let Some(collections) = json.get("collections").and_then(serde_json::Value::as_object) {
            for (name, value) in collections {
                data.collections
                    .insert(name.clone(), CollectionMetadata::from_json(value)?);
            }
        }
        if let Some(locks) = json.get("locks").and_then(serde_json::Value::as_object) {
            for (name, value) in locks {
                data.locks.insert(name.clone(), LockEntry::from_json(value)?);
            }
        }
        Ok(data)
    }

    fn store(&self, mut data: IndexData) -> DbResult<()> {
        data.version += 1;

        let collections: serde_json::Map<String, serde_json::Value> = data
            .collections
            .iter()
            .map(|(name, meta)| (name.clone(), meta.to_json()))
            .collect();
        let locks: serde_json::Map<String, serde_json::Value> = data
            .locks
            .iter()
            .map(|(name, entry)| (name.clone(), entry.to_json()))
            .collect();
        let json = serde_json::json!({
            "collections": collections,
            "locks": locks,
            "version": data.version,
        });

        let text = serde_json::to_string(&json)
            .map_err(|e| DbError::internal(format!("master index encoding: {e}")))?;
        self.props.set(&self.key, &text)?;
        Ok(())
    }
}

impl std::fmt::Debug for MasterIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterIndex")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
