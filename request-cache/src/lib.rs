//! Short-TTL response caching with in-flight request coalescing.
//!
//! A [`RequestCache`] answers `fetch_with_cache(key, fetch_fn)` from a stored
//! response while it is fresh, joins a fetch that is already running for the
//! same key, or starts exactly one new fetch. Failed fetches are handed to every
//! waiting caller and leave nothing behind. A fetch that panics is unregistered
//! too, and the panic is raised again in every caller that was waiting on it.

pub mod cache;
mod config;
pub mod deduplication;


use cache::ResponseCache;
use chrono::Duration;
use deduplication::{Claim, FetchOutcome, FetchPanicked, RequestDeduplicator};
use futures::future::{BoxFuture, FutureExt};
use getset::Getters;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use cache::{CacheStats, CachedResult};
pub use config::CacheConfig;

#[derive(Default, Debug)]
struct Counters {
    hits: AtomicU64,
    coalesced: AtomicU64,
    fetches: AtomicU64,
    failures: AtomicU64,
}

/// Response cache plus in-flight deduplication for one kind of value.
///
/// Clones are handles onto the same state. `V` and `E` are cloned out to every
/// caller, so wrap large values in an [`Arc`].
#[derive(Getters)]
pub struct RequestCache<V, E> {
    #[get = "pub"]
    config: CacheConfig,
    responses: ResponseCache<V>,
    deduplicator: RequestDeduplicator<V, E>,
    counters: Arc<Counters>,
}

impl<V, E> Clone for RequestCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            responses: self.responses.clone(),
            deduplicator: self.deduplicator.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<V, E> Default for RequestCache<V, E> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<V, E> RequestCache<V, E> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            responses: ResponseCache::default(),
            deduplicator: RequestDeduplicator::default(),
            counters: Arc::default(),
        }
    }
}

impl<V, E> RequestCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Fetch `key` through the cache using the configured default TTL
    pub async fn fetch_with_cache<F, Fut>(&self, key: impl Into<String>, fetch_fn: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.fetch_with_ttl(key, self.config.default_ttl, fetch_fn)
            .await
    }

    /// Fetch `key` through the cache, reusing a stored response younger than `ttl`.
    ///
    /// `fetch_fn` is only invoked when there is neither a fresh response nor a
    /// fetch already running for `key`.
    pub async fn fetch_with_ttl<F, Fut>(
        &self,
        key: impl Into<String>,
        ttl: Duration,
        fetch_fn: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let key = key.into();

        if !self.config.enabled {
            return fetch_fn().await;
        }

        if let Some(value) = self.responses.get(&key, ttl) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let claim = self.deduplicator.claim(
            &key,
            || self.responses.get(&key, ttl),
            |id| self.start_fetch(key.clone(), id, fetch_fn),
        );

        let fetch = match claim {
            Claim::Cached(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
            Claim::Joined(fetch) => {
                log::debug!("Request already pending for key: {}", key);
                self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                fetch
            }
            Claim::Started(fetch) => {
                log::debug!("Executing new request for key: {}", key);
                fetch
            }
        };

        match fetch.await {
            Ok(result) => result,
            Err(panicked) => panic!("Fetch for key {} panicked: {}", key, panicked),
        }
    }

    /// Wraps `fetch_fn` so that whichever caller completes it also records the
    /// outcome and unregisters it.
    fn start_fetch<F, Fut>(&self, key: String, id: u64, fetch_fn: F) -> BoxFuture<'static, FetchOutcome<V, E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let responses = self.responses.clone();
        let deduplicator = self.deduplicator.clone();
        let counters = Arc::clone(&self.counters);

        async move {
            counters.fetches.fetch_add(1, Ordering::Relaxed);
            // `fetch_fn` itself may panic before handing back a future
            let outcome = AssertUnwindSafe(async move { fetch_fn().await })
                .catch_unwind()
                .await
                .map_err(|payload| FetchPanicked::from_payload(&*payload));

            deduplicator.finish(&key, id, || match &outcome {
                Ok(Ok(value)) => responses.put(key.clone(), value.clone()),
                Ok(Err(_)) => {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Fetch failed for key: {}, nothing cached", key);
                }
                Err(panicked) => {
                    counters.failures.fetch_add(1, Ordering::Relaxed);
                    log::error!("Fetch panicked for key: {}, nothing cached: {}", key, panicked);
                }
            });

            outcome
        }
        .boxed()
    }
}

impl<V, E> RequestCache<V, E> {
    /// Forget the stored response for `key`. A fetch already running for it is left alone.
    pub fn invalidate(&self, key: &str) {
        self.responses.invalidate(key);
    }

    /// Forget every stored response whose key matches `predicate`
    pub fn invalidate_matching<P>(&self, predicate: P)
    where
        P: Fn(&str) -> bool,
    {
        self.responses.invalidate_matching(predicate);
    }

    /// Forget every stored response whose key starts with `prefix`, e.g. `customer_42_`
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.responses.invalidate_matching(|key| key.starts_with(prefix));
    }

    /// Drop responses older than `ttl`, returning how many were dropped
    pub fn evict_expired(&self, ttl: Duration) -> usize {
        self.responses.evict_expired(ttl)
    }

    /// Clear all stored responses
    pub fn clear(&self) {
        self.responses.clear();
    }

    /// Whether a response younger than `ttl` is stored for `key`
    pub fn contains_fresh(&self, key: &str, ttl: Duration) -> bool {
        self.responses.contains_fresh(key, ttl)
    }

    /// Whether a fetch for `key` is currently registered
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.deduplicator.is_pending(key)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let total_entries = self.responses.len();
        let valid_entries = self.responses.valid_len(self.config.default_ttl);

        CacheStats {
            total_entries,
            valid_entries,
            expired_entries: total_entries.saturating_sub(valid_entries),
            in_flight: self.deduplicator.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}
