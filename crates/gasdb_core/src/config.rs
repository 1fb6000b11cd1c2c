//! Database configuration.

use crate::file_service::FileServiceConfig;
use crate::lock_service::DEFAULT_LOCK_TIMEOUT;
use crate::master_index::DEFAULT_MASTER_INDEX_KEY;
use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Property-store key holding the master index.
    pub master_index_key: String,

    /// How long public operations wait on the process-wide lock.
    pub lock_timeout: Duration,

    /// Lifetime of per-collection advisory lock entries.
    pub collection_lock_ttl: Duration,

    /// How long cached blob reads stay fresh.
    pub cache_read_ttl: Duration,

    /// Consecutive backend failures before the circuit breaker opens.
    pub breaker_threshold: u32,

    /// How long an open circuit breaker fails fast before probing.
    pub breaker_cooloff: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            master_index_key: DEFAULT_MASTER_INDEX_KEY.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            collection_lock_ttl: Duration::from_secs(30),
            cache_read_ttl: Duration::from_millis(500),
            breaker_threshold: 3,
            breaker_cooloff: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the master-index property key.
    #[must_use]
    pub fn master_index_key(mut self, key: impl Into<String>) -> Self {
        self.master_index_key = key.into();
        self
    }

    /// Sets the process-wide lock timeout.
    #[must_use]
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the advisory collection-lock lifetime.
    #[must_use]
    pub fn collection_lock_ttl(mut self, ttl: Duration) -> Self {
        self.collection_lock_ttl = ttl;
        self
    }

    /// Sets the blob read-cache window.
    #[must_use]
    pub fn cache_read_ttl(mut self, ttl: Duration) -> Self {
        self.cache_read_ttl = ttl;
        self
    }

    /// Sets the circuit-breaker failure threshold.
    #[must_use]
    pub fn breaker_threshold(mut self, threshold: u32) -> Self {
        self.breaker_threshold = threshold;
        self
    }

    /// Sets the circuit-breaker cool-off.
    #[must_use]
    pub fn breaker_cooloff(mut self, cooloff: Duration) -> Self {
        self.breaker_cooloff = cooloff;
        self
    }

    pub(crate) fn file_service_config(&self) -> FileServiceConfig {
        FileServiceConfig {
            read_ttl: self.cache_read_ttl,
            breaker_threshold: self.breaker_threshold,
            breaker_cooloff: self.breaker_cooloff,
        }
    }
}
