//! In-memory caches
//!
//! These caches are volatile and cleared on restart.
//! Uses Moka for high-performance concurrent caching.

use moka::future::Cache;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;

/// Upper bound on entries held by any one response cache
const MAX_ENTRIES: u64 = 10_000;

/// Short-lived cache for rendered responses
///
/// Entries expire `ttl` after insertion. Concurrent misses for the same key
/// share one computation; failed computations are not stored.
pub struct ResponseCache<K, V> {
    name: &'static str,
    entries: Cache<K, V>,
}

impl<K, V> ResponseCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create new response cache
    ///
    /// # Arguments
    /// * `name` - Label used for cache metrics
    /// * `ttl` - Time to live of each entry
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .time_to_live(ttl)
            .build();

        Self { name, entries }
    }

    /// Get the cached value or compute and store it
    ///
    /// # Errors
    /// Returns the error of `init`; nothing is cached in that case.
    pub async fn get_or_try_insert<F>(&self, key: K, init: F) -> Result<V, AppError>
    where
        F: Future<Output = Result<V, AppError>>,
    {
        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL, CACHE_SIZE};

        if let Some(value) = self.entries.get(&key).await {
            CACHE_HITS_TOTAL.with_label_values(&[self.name]).inc();
            return Ok(value);
        }
        CACHE_MISSES_TOTAL.with_label_values(&[self.name]).inc();

        let value = self
            .entries
            .try_get_with(key, init)
            .await
            .map_err(|err: Arc<AppError>| AppError::from_shared(err))?;

        CACHE_SIZE
            .with_label_values(&[self.name])
            .set(self.entries.entry_count() as i64);

        Ok(value)
    }

    /// Get a value without computing it
    #[cfg(test)]
    pub async fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).await
    }
}
