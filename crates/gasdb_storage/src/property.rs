//! Property-store driver trait and the exclusive-lock guard.

use crate::error::StorageResult;
use std::time::Duration;

/// A key/value property-store driver for GASDB.
///
/// The property store holds small coordination strings (the master
/// index) and exposes the platform's native exclusive lock. On the
/// reference platform this is the script property service plus its lock
/// service; the drivers in this crate provide in-memory and
/// local-filesystem equivalents.
///
/// # Invariants
///
/// - `get` returns the value last `set` for the key, or `None`
/// - While an [`ExclusiveGuard`] is alive, no other
///   `acquire_exclusive` call on the same store succeeds
/// - Drivers must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::MemoryPropertyStore`] - For testing
/// - [`super::FilePropertyStore`] - For persistent local storage
pub trait PropertyStore: Send + Sync {
    /// Reads the value for a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes the value for a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes a key. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Acquires the store's exclusive lock, waiting up to `timeout`.
    ///
    /// The returned guard releases the lock when dropped, on every exit
    /// path including panics.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::LockTimeout`] if the lock is not
    /// acquired within `timeout`.
    fn acquire_exclusive(&self, timeout: Duration) -> StorageResult<ExclusiveGuard>;
}

/// Runs `f` while holding the store's exclusive lock.
///
/// Mirror of the platform's closure-style lock API over the guard form.
///
/// # Errors
///
/// Returns [`crate::StorageError::LockTimeout`] if the lock is not
/// acquired within `timeout`.
pub fn with_exclusive<T>(
    store: &dyn PropertyStore,
    timeout: Duration,
    f: impl FnOnce() -> T,
) -> StorageResult<T> {
    let _guard = store.acquire_exclusive(timeout)?;
    Ok(f())
}

/// Guard for the property store's exclusive lock.
///
/// Dropping the guard releases the lock.
pub struct ExclusiveGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ExclusiveGuard {
    /// Creates a guard that runs `release` when dropped.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for ExclusiveGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusiveGuard").finish_non_exhaustive()
    }
}
