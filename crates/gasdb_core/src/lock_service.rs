//! Two-tier locking.
//!
//! **Process-wide exclusive lock** - the platform lock exposed by the
//! property-store driver. Every public mutation runs under it, which
//! totally orders operations within one running instance. The guard
//! releases on drop, so no exit path can leak the lock.
//!
//! **Per-collection application lock** - a cooperative entry in the
//! master index keyed by collection name. It serialises mutations
//! across *separate instances* sharing the same backend. It is
//! advisory: correctness against non-cooperating writers additionally
//! rests on the modification-token check at publish time. Both tiers
//! are needed; neither subsumes the other.

use crate::error::DbResult;
use crate::master_index::MasterIndex;
use gasdb_storage::{ExclusiveGuard, PropertyStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Smallest timeout the service will honour. Shorter requests are
/// clamped up with a warning.
pub const MIN_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout used when the caller does not specify one.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Guard for the process-wide exclusive lock.
///
/// Dropping the guard releases the lock on every exit path, including
/// unwinding.
#[derive(Debug)]
pub struct ProcessLockGuard {
    _inner: ExclusiveGuard,
}

/// Acquires and tracks both lock tiers.
pub struct LockService {
    props: Arc<dyn PropertyStore>,
    index: Arc<MasterIndex>,
}

impl LockService {
    /// Creates a lock service over the property-store driver and the
    /// master index.
    pub fn new(props: Arc<dyn PropertyStore>, index: Arc<MasterIndex>) -> Self {
        Self { props, index }
    }

    /// Acquires the process-wide exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LockTimeout`] when the lock is not acquired
    /// within the (clamped) timeout.
    pub fn acquire(&self, timeout: Duration) -> DbResult<ProcessLockGuard> {
        let timeout = clamp_timeout(timeout);
        let guard = self.props.acquire_exclusive(timeout)?;
        Ok(ProcessLockGuard { _inner: guard })
    }

    /// Acquires the process-wide lock with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::LockTimeout`] on contention past the default
    /// timeout.
    pub fn acquire_default(&self) -> DbResult<ProcessLockGuard> {
        self.acquire(DEFAULT_LOCK_TIMEOUT)
    }

    /// Takes the advisory lock on a collection for `operation_id`.
    ///
    /// The entry lives for the (clamped) `ttl` and counts as absent
    /// afterwards. Returns whether the lock is now held by
    /// `operation_id`; a live entry held by someone else yields
    /// `false`, never an error.
    ///
    /// # Errors
    ///
    /// Propagates process-lock timeouts and backend failures.
    pub fn acquire_collection_lock(
        &self,
        name: &str,
        operation_id: &str,
        ttl: Duration,
    ) -> DbResult<bool> {
        let ttl = clamp_timeout(ttl);
        let _guard = self.acquire_default()?;
        self.index.try_acquire_lock(name, operation_id, ttl)
    }

    /// Releases the advisory lock on a collection.
    ///
    /// Only the holding `operation_id` releases; returns whether an
    /// entry was removed.
    ///
    /// # Errors
    ///
    /// Propagates process-lock timeouts and backend failures.
    pub fn release_collection_lock(&self, name: &str, operation_id: &str) -> DbResult<bool> {
        let _guard = self.acquire_default()?;
        self.index.release_lock(name, operation_id)
    }

    /// Whether a live advisory lock exists for a collection.
    ///
    /// # Errors
    ///
    /// Propagates process-lock timeouts and backend failures.
    pub fn is_collection_locked(&self, name: &str) -> DbResult<bool> {
        let _guard = self.acquire_default()?;
        self.index.is_locked(name)
    }

    /// Reaps expired advisory lock entries, returning how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Propagates process-lock timeouts and backend failures.
    pub fn cleanup_expired_collection_locks(&self) -> DbResult<usize> {
        let _guard = self.acquire_default()?;
        self.index.cleanup_expired_locks()
    }
}

impl std::fmt::Debug for LockService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockService").finish_non_exhaustive()
    }
}

fn clamp_timeout(timeout: Duration) -> Duration {
    if timeout < MIN_LOCK_TIMEOUT {
        warn!(
            requested_ms = timeout.as_millis() as u64,
            minimum_ms = MIN_LOCK_TIMEOUT.as_millis() as u64,
            "lock timeout below minimum; clamping"
        );
        MIN_LOCK_TIMEOUT
    } else {
        timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::master_index::DEFAULT_MASTER_INDEX_KEY;
    use gasdb_storage::MemoryPropertyStore;

    fn service() -> LockService {
        let props: Arc<dyn PropertyStore> = Arc::new(MemoryPropertyStore::new());
        let index = Arc::new(MasterIndex::new(
            Arc::clone(&props),
            DEFAULT_MASTER_INDEX_KEY,
        ));
        LockService::new(props, index)
    }

    #[test]
    fn process_lock_excludes_and_releases() {
        let service = service();

        let guard = service.acquire(Duration::from_secs(2)).unwrap();
        // The lock is the driver's: a second acquisition times out. The
        // clamp floors the wait at one second.
        let contended = service.acquire(Duration::from_millis(1));
        assert!(matches!(contended, Err(DbError::LockTimeout { .. })));

        drop(guard);
        assert!(service.acquire(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn tiny_timeouts_are_clamped() {
        assert_eq!(clamp_timeout(Duration::from_millis(5)), MIN_LOCK_TIMEOUT);
        assert_eq!(
            clamp_timeout(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn collection_lock_lifecycle() {
        let service = service();
        let ttl = Duration::from_secs(30);

        assert!(service
            .acquire_collection_lock("users", "op-1", ttl)
            .unwrap());
        assert!(service.is_collection_locked("users").unwrap());

        // A competing operation is turned away without error.
        assert!(!service
            .acquire_collection_lock("users", "op-2", ttl)
            .unwrap());

        // Wrong holder cannot release.
        assert!(!service.release_collection_lock("users", "op-2").unwrap());
        assert!(service.release_collection_lock("users", "op-1").unwrap());
        assert!(!service.is_collection_locked("users").unwrap());
    }

    #[test]
    fn expired_collection_locks_are_reaped() {
        let service = service();

        // TTL is clamped to the one-second minimum, so wait it out.
        assert!(service
            .acquire_collection_lock("users", "op-1", Duration::from_millis(1))
            .unwrap());
        std::thread::sleep(Duration::from_millis(1100));

        assert!(!service.is_collection_locked("users").unwrap());
        assert_eq!(service.cleanup_expired_collection_locks().unwrap(), 1);
    }
}
