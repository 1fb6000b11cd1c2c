//! Caching layer over the blob-store driver.

use crate::error::{DbError, DbResult};
use gasdb_storage::{BlobStore, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tuning knobs for [`FileService`].
#[derive(Debug, Clone)]
pub struct FileServiceConfig {
    /// How long a cached read stays fresh; reads within the window are
    /// coalesced and never hit the driver.
    pub read_ttl: Duration,
    /// Consecutive driver failures before the circuit breaker opens.
    pub breaker_threshold: u32,
    /// How long an open breaker fails fast before probing again.
    pub breaker_cooloff: Duration,
}

impl Default for FileServiceConfig {
    fn default() -> Self {
        Self {
            read_ttl: Duration::from_millis(500),
            breaker_threshold: 3,
            breaker_cooloff: Duration::from_secs(30),
        }
    }
}

/// A thin cache over the blob-store driver.
///
/// Per handle the service tracks `{content, loaded_at, dirty}`:
///
/// - Reads within [`FileServiceConfig::read_ttl`] of the last load are
///   served from cache.
/// - Writes of content equal to the clean cached copy are suppressed;
///   [`FileService::mark_dirty`] forces the next write through.
///
/// A circuit breaker counts consecutive driver failures. Once open,
/// operations fail fast with `BackendUnavailable` until the cool-off
/// elapses, after which one probing call is let through.
pub struct FileService {
    driver: Arc<dyn BlobStore>,
    config: FileServiceConfig,
    state: Mutex<ServiceState>,
}

#[derive(Default)]
struct ServiceState {
    cache: HashMap<String, CacheEntry>,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

struct CacheEntry {
    content: serde_json::Value,
    loaded_at: Instant,
    dirty: bool,
}

impl FileService {
    /// Creates a service over a driver.
    pub fn new(driver: Arc<dyn BlobStore>, config: FileServiceConfig) -> Self {
        Self {
            driver,
            config,
            state: Mutex::new(ServiceState::default()),
        }
    }

    /// Reads a blob, serving fresh cache hits without touching the
    /// driver.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when the breaker is open or the driver
    /// fails.
    pub fn read(&self, handle: &str) -> DbResult<serde_json::Value> {
        {
            let state = self.state.lock();
            if let Some(entry) = state.cache.get(handle) {
                if !entry.dirty && entry.loaded_at.elapsed() < self.config.read_ttl {
                    return Ok(entry.content.clone());
                }
            }
        }

        self.check_breaker()?;
        match self.driver.read_file(handle) {
            Ok(content) => {
                let mut state = self.state.lock();
                self.record_success(&mut state);
                state.cache.insert(
                    handle.to_string(),
                    CacheEntry {
                        content: content.clone(),
                        loaded_at: Instant::now(),
                        dirty: false,
                    },
                );
                Ok(content)
            }
            Err(err) => Err(self.record_failure(err)),
        }
    }

    /// Writes a blob, suppressing writes whose content equals the clean
    /// cached copy.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when the breaker is open or the driver
    /// fails.
    pub fn write(&self, handle: &str, content: &serde_json::Value) -> DbResult<()> {
        {
            let state = self.state.lock();
            if let Some(entry) = state.cache.get(handle) {
                if !entry.dirty && &entry.content == content {
                    debug!(handle, "suppressing write of unchanged blob");
                    return Ok(());
                }
            }
        }

        self.check_breaker()?;
        match self.driver.write_file(handle, content) {
            Ok(()) => {
                let mut state = self.state.lock();
                self.record_success(&mut state);
                state.cache.insert(
                    handle.to_string(),
                    CacheEntry {
                        content: content.clone(),
                        loaded_at: Instant::now(),
                        dirty: false,
                    },
                );
                Ok(())
            }
            Err(err) => Err(self.record_failure(err)),
        }
    }

    /// Creates a blob and caches its content under the new handle.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when the breaker is open or the driver
    /// fails.
    pub fn create(&self, name: &str, content: &serde_json::Value) -> DbResult<String> {
        self.check_breaker()?;
        match self.driver.create_file(name, content) {
            Ok(handle) => {
                let mut state = self.state.lock();
                self.record_success(&mut state);
                state.cache.insert(
                    handle.clone(),
                    CacheEntry {
                        content: content.clone(),
                        loaded_at: Instant::now(),
                        dirty: false,
                    },
                );
                Ok(handle)
            }
            Err(err) => Err(self.record_failure(err)),
        }
    }

    /// Deletes a blob and evicts it from the cache.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` when the breaker is open or the driver
    /// fails.
    pub fn delete(&self, handle: &str) -> DbResult<()> {
        self.check_breaker()?;
        match self.driver.delete_file(handle) {
            Ok(()) => {
                let mut state = self.state.lock();
                self.record_success(&mut state);
                state.cache.remove(handle);
                Ok(())
            }
            Err(err) => Err(self.record_failure(err)),
        }
    }

    /// Marks a cached blob dirty: its cache entry no longer satisfies
    /// reads, and the next write goes through even when unchanged.
    pub fn mark_dirty(&self, handle: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.cache.get_mut(handle) {
            entry.dirty = true;
        }
    }

    /// Drops a handle's cache entry.
    pub fn evict(&self, handle: &str) {
        self.state.lock().cache.remove(handle);
    }

    fn check_breaker(&self) -> DbResult<()> {
        let mut state = self.state.lock();
        if let Some(opened_at) = state.opened_at {
            if opened_at.elapsed() < self.config.breaker_cooloff {
                return Err(DbError::backend_unavailable(
                    "circuit breaker open after repeated backend failures",
                ));
            }
            // Cool-off elapsed: let one probing call through.
            debug!("circuit breaker probing backend after cool-off");
            state.opened_at = None;
            state.consecutive_failures = self.config.breaker_threshold.saturating_sub(1);
        }
        Ok(())
    }

    #[allow(clippy::unused_self)]
    fn record_success(&self, state: &mut ServiceState) {
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    fn record_failure(&self, err: StorageError) -> DbError {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.breaker_threshold {
            warn!(
                failures = state.consecutive_failures,
                "circuit breaker opened after repeated backend failures"
            );
            state.opened_at = Some(Instant::now());
        }
        err.into()
    }
}

impl std::fmt::Debug for FileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FileService")
            .field("cached_blobs", &state.cache.len())
            .field("breaker_open", &state.opened_at.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gasdb_storage::MemoryBlobStore;
    use serde_json::json;

    fn service(config: FileServiceConfig) -> (FileService, Arc<MemoryBlobStore>) {
        let driver = Arc::new(MemoryBlobStore::new());
        (
            FileService::new(Arc::clone(&driver) as Arc<dyn BlobStore>, config),
            driver,
        )
    }

    #[test]
    fn read_within_window_is_served_from_cache() {
        let (service, driver) = service(FileServiceConfig::default());
        let handle = service.create("col", &json!({"v": 1})).unwrap();

        // Backend failures are invisible while the cache is fresh.
        driver.fail_next_n(5);
        assert_eq!(service.read(&handle).unwrap(), json!({"v": 1}));
        assert_eq!(service.read(&handle).unwrap(), json!({"v": 1}));
    }

    #[test]
    fn dirty_entry_bypasses_read_cache() {
        let (service, driver) = service(FileServiceConfig::default());
        let handle = service.create("col", &json!({"v": 1})).unwrap();

        service.mark_dirty(&handle);
        driver.fail_next_n(1);
        assert!(service.read(&handle).is_err());
    }

    #[test]
    fn unchanged_write_is_suppressed() {
        let (service, driver) = service(FileServiceConfig::default());
        let handle = service.create("col", &json!({"v": 1})).unwrap();

        // The driver would fail, but the write never reaches it.
        driver.fail_next_n(1);
        service.write(&handle, &json!({"v": 1})).unwrap();

        // A changed write does reach the (still failing) driver.
        assert!(service.write(&handle, &json!({"v": 2})).is_err());
    }

    #[test]
    fn marked_dirty_write_goes_through() {
        let (service, driver) = service(FileServiceConfig::default());
        let handle = service.create("col", &json!({"v": 1})).unwrap();

        service.mark_dirty(&handle);
        service.write(&handle, &json!({"v": 1})).unwrap();
        assert_eq!(driver.read_file(&handle).unwrap(), json!({"v": 1}));
    }

    #[test]
    fn breaker_opens_after_threshold_and_fails_fast() {
        let config = FileServiceConfig {
            read_ttl: Duration::ZERO,
            breaker_threshold: 2,
            breaker_cooloff: Duration::from_secs(60),
        };
        let (service, driver) = service(config);
        let handle = service.create("col", &json!({})).unwrap();

        driver.fail_next_n(2);
        assert!(service.read(&handle).is_err());
        assert!(service.read(&handle).is_err());

        // Breaker now open: the driver is healthy again but calls fail
        // fast without reaching it.
        let result = service.read(&handle);
        assert!(matches!(result, Err(DbError::BackendUnavailable { .. })));
    }

    #[test]
    fn breaker_probes_after_cooloff() {
        let config = FileServiceConfig {
            read_ttl: Duration::ZERO,
            breaker_threshold: 1,
            breaker_cooloff: Duration::from_millis(20),
        };
        let (service, driver) = service(config);
        let handle = service.create("col", &json!({"v": 1})).unwrap();

        driver.fail_next_n(1);
        assert!(service.read(&handle).is_err());
        assert!(service.read(&handle).is_err()); // open, fails fast

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(service.read(&handle).unwrap(), json!({"v": 1}));
    }

    #[test]
    fn delete_evicts_cache() {
        let (service, _driver) = service(FileServiceConfig::default());
        let handle = service.create("col", &json!({})).unwrap();

        service.delete(&handle).unwrap();
        assert!(service.read(&handle).is_err());
    }
}
