//! In-memory drivers for testing and ephemeral databases.

use crate::blob::BlobStore;
use crate::error::{StorageError, StorageResult};
use crate::property::{ExclusiveGuard, PropertyStore};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How often lock acquisition re-polls a contended exclusive lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// An in-memory blob-store driver.
///
/// Suitable for unit tests, integration tests, and ephemeral databases
/// that don't need persistence.
///
/// # Failure Injection
///
/// [`MemoryBlobStore::fail_next_n`] makes the next *n* operations fail
/// with an I/O error, which is how the circuit-breaker tests exercise
/// backend outages.
///
/// # Example
///
/// ```rust
/// use gasdb_storage::{BlobStore, MemoryBlobStore};
/// use serde_json::json;
///
/// let store = MemoryBlobStore::new();
/// let handle = store.create_file("users", &json!({"documents": {}})).unwrap();
/// let content = store.read_file(&handle).unwrap();
/// assert_eq!(content, json!({"documents": {}}));
/// ```
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    files: RwLock<HashMap<String, serde_json::Value>>,
    fail_remaining: Mutex<u32>,
}

impl MemoryBlobStore {
    /// Creates a new empty in-memory blob store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` operations fail with an injected I/O error.
    pub fn fail_next_n(&self, n: u32) {
        *self.fail_remaining.lock() = n;
    }

    /// Returns the number of blobs currently stored.
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.files.read().len()
    }

    fn check_injected_failure(&self) -> StorageResult<()> {
        let mut remaining = self.fail_remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(StorageError::Io(std::io::Error::other(
                "injected backend failure",
            )));
        }
        Ok(())
    }
}

impl BlobStore for MemoryBlobStore {
    fn read_file(&self, handle: &str) -> StorageResult<serde_json::Value> {
        self.check_injected_failure()?;
        self.files
            .read()
            .get(handle)
            .cloned()
            .ok_or_else(|| StorageError::not_found(handle))
    }

    fn write_file(&self, handle: &str, content: &serde_json::Value) -> StorageResult<()> {
        self.check_injected_failure()?;
        let mut files = self.files.write();
        match files.get_mut(handle) {
            Some(slot) => {
                *slot = content.clone();
                Ok(())
            }
            None => Err(StorageError::not_found(handle)),
        }
    }

    fn create_file(&self, name: &str, content: &serde_json::Value) -> StorageResult<String> {
        self.check_injected_failure()?;
        let handle = format!("mem-{}-{}", sanitize(name), Uuid::new_v4());
        self.files.write().insert(handle.clone(), content.clone());
        Ok(handle)
    }

    fn delete_file(&self, handle: &str) -> StorageResult<()> {
        self.check_injected_failure()?;
        match self.files.write().remove(handle) {
            Some(_) => Ok(()),
            None => Err(StorageError::not_found(handle)),
        }
    }
}

/// An in-memory property-store driver.
///
/// The exclusive lock is an atomic flag polled with a small backoff,
/// matching the file driver's advisory-lock poll loop.
#[derive(Debug, Default)]
pub struct MemoryPropertyStore {
    props: RwLock<HashMap<String, String>>,
    locked: Arc<AtomicBool>,
}

impl MemoryPropertyStore {
    /// Creates a new empty in-memory property store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.props.read().len()
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.props.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.props
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.props.write().remove(key);
        Ok(())
    }

    fn acquire_exclusive(&self, timeout: Duration) -> StorageResult<ExclusiveGuard> {
        let started = Instant::now();
        loop {
            if self
                .locked
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                let flag = Arc::clone(&self.locked);
                return Ok(ExclusiveGuard::new(move || {
                    flag.store(false, Ordering::Release);
                }));
            }
            if started.elapsed() >= timeout {
                return Err(StorageError::LockTimeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            std::thread::sleep(LOCK_POLL_INTERVAL);
        }
    }
}

pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blob_create_read_write_delete() {
        let store = MemoryBlobStore::new();

        let handle = store.create_file("users", &json!({"a": 1})).unwrap();
        assert_eq!(store.read_file(&handle).unwrap(), json!({"a": 1}));

        store.write_file(&handle, &json!({"a": 2})).unwrap();
        assert_eq!(store.read_file(&handle).unwrap(), json!({"a": 2}));

        store.delete_file(&handle).unwrap();
        assert!(matches!(
            store.read_file(&handle),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn blob_write_unknown_handle_fails() {
        let store = MemoryBlobStore::new();
        let result = store.write_file("nope", &json!({}));
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn blob_handles_are_unique() {
        let store = MemoryBlobStore::new();
        let h1 = store.create_file("col", &json!({})).unwrap();
        let h2 = store.create_file("col", &json!({})).unwrap();
        assert_ne!(h1, h2);
        assert_eq!(store.blob_count(), 2);
    }

    #[test]
    fn blob_failure_injection() {
        let store = MemoryBlobStore::new();
        let handle = store.create_file("col", &json!({})).unwrap();

        store.fail_next_n(2);
        assert!(store.read_file(&handle).is_err());
        assert!(store.read_file(&handle).is_err());
        assert!(store.read_file(&handle).is_ok());
    }

    #[test]
    fn props_get_set_delete() {
        let store = MemoryPropertyStore::new();

        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);

        // Deleting an absent key is a no-op.
        store.delete("k").unwrap();
    }

    #[test]
    fn exclusive_lock_blocks_second_acquire() {
        let store = MemoryPropertyStore::new();

        let guard = store.acquire_exclusive(Duration::from_millis(50)).unwrap();
        let contended = store.acquire_exclusive(Duration::from_millis(30));
        assert!(matches!(contended, Err(StorageError::LockTimeout { .. })));

        drop(guard);
        assert!(store.acquire_exclusive(Duration::from_millis(50)).is_ok());
    }

    #[test]
    fn exclusive_lock_released_on_drop() {
        let store = MemoryPropertyStore::new();
        {
            let _guard = store.acquire_exclusive(Duration::from_millis(50)).unwrap();
        }
        assert!(store.acquire_exclusive(Duration::from_millis(50)).is_ok());
    }

    #[test]
    fn with_exclusive_runs_closure() {
        let store = MemoryPropertyStore::new();
        let result =
            crate::with_exclusive(&store, Duration::from_millis(50), || 41 + 1).unwrap();
        assert_eq!(result, 42);
    }
}
