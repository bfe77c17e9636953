use chrono::Duration;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;

/// Cached response with the instant it was stored
#[derive(Clone, Debug)]
pub struct CachedResult<V> {
    pub data: V,
    pub stored_at: Instant,
}

impl<V> CachedResult<V> {
    pub fn new(data: V) -> Self {
        Self {
            data,
            stored_at: Instant::now(),
        }
    }

    /// Check if the cached result may still be reused under `ttl`.
    /// A zero or negative TTL never accepts a stored result.
    pub fn is_valid(&self, ttl: Duration) -> bool {
        match ttl.to_std() {
            Ok(ttl) => self.stored_at.elapsed() < ttl,
            Err(_) => false,
        }
    }
}

/// Completed responses keyed by the caller's cache key.
///
/// Freshness is decided by the reader's TTL, so reads never remove entries;
/// only the explicit invalidation methods and [`ResponseCache::evict_expired`] do.
pub struct ResponseCache<V> {
    entries: Arc<DashMap<String, CachedResult<V>>>,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for ResponseCache<V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get cached result if available and valid under `ttl`
    pub fn get(&self, key: &str, ttl: Duration) -> Option<V> {
        let cached = self.entries.get(key)?;
        if cached.is_valid(ttl) {
            log::debug!("Cache hit for key: {}", key);
            Some(cached.data.clone())
        } else {
            log::debug!("Cache entry stale for key: {}", key);
            None
        }
    }

    /// Store result in cache, replacing whatever was stored under `key`
    pub fn put(&self, key: String, data: V) {
        log::debug!("Stored in cache with key: {}", key);
        self.entries.insert(key, CachedResult::new(data));
    }
}

impl<V> ResponseCache<V> {
    pub fn contains_fresh(&self, key: &str, ttl: Duration) -> bool {
        self.entries
            .get(key)
            .is_some_and(|cached| cached.is_valid(ttl))
    }

    /// Remove a single entry. Returns whether anything was stored under `key`.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            log::debug!("Invalidated cache key: {}", key);
        }
        removed
    }

    /// Remove every entry whose key matches `predicate`, returning how many went away
    pub fn invalidate_matching<P>(&self, predicate: P) -> usize
    where
        P: Fn(&str) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        let removed = before.saturating_sub(self.entries.len());
        log::debug!("Invalidated {} cache entries", removed);
        removed
    }

    /// Remove entries that are no longer valid under `ttl`
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, cached| cached.is_valid(ttl));
        let evicted = before.saturating_sub(self.entries.len());
        log::debug!("Evicted {} expired cache entries", evicted);
        evicted
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        self.entries.clear();
        log::info!("Cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries still valid under `ttl`
    pub fn valid_len(&self, ttl: Duration) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_valid(ttl))
            .count()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    /// Entries still valid under the configured default TTL
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub in_flight: usize,
    /// Calls answered from a stored response
    pub hits: u64,
    /// Calls that joined a fetch someone else started
    pub coalesced: u64,
    /// Fetches actually started
    pub fetches: u64,
    pub failures: u64,
}
