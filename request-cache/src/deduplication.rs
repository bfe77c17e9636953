use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handed to every caller of a fetch that panicked instead of completing.
/// Carries the panic message, since the payload itself cannot be shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPanicked(pub Arc<str>);

impl FetchPanicked {
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            *message
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.as_str()
        } else {
            "non-string panic payload"
        };
        Self(Arc::from(message))
    }
}

impl fmt::Display for FetchPanicked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What every caller of one fetch observes
pub type FetchOutcome<V, E> = Result<Result<V, E>, FetchPanicked>;

/// A fetch that any number of callers can await; all of them see the same outcome
pub type SharedFetch<V, E> = Shared<BoxFuture<'static, FetchOutcome<V, E>>>;

/// Represents a pending request
struct PendingRequest<V, E> {
    id: u64,
    fetch: SharedFetch<V, E>,
}

/// Outcome of claiming a key
pub enum Claim<V, E> {
    /// A fresh response turned up while the key was held
    Cached(V),
    /// Someone else's fetch for the key is still running
    Joined(SharedFetch<V, E>),
    /// This caller registered a new fetch and should drive it
    Started(SharedFetch<V, E>),
}

/// Request deduplication system.
/// While a fetch for a key is outstanding, every other request for that key
/// awaits the same shared future instead of starting its own.
pub struct RequestDeduplicator<V, E> {
    pending: Arc<DashMap<String, PendingRequest<V, E>>>,
    next_id: Arc<AtomicU64>,
}

impl<V, E> Clone for RequestDeduplicator<V, E> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<V, E> Default for RequestDeduplicator<V, E> {
    fn default() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<V, E> RequestDeduplicator<V, E>
where
    V: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the pending fetch for `key`, or register a new one built by `start`.
    ///
    /// Checking and registering happen under the map's lock for `key`, so two
    /// callers can never both register. `check_cache` runs under that same lock
    /// before registering, which catches a fetch that completed after the
    /// caller's first cache lookup. Neither closure may touch this deduplicator.
    pub fn claim<C, S>(&self, key: &str, check_cache: C, start: S) -> Claim<V, E>
    where
        C: FnOnce() -> Option<V>,
        S: FnOnce(u64) -> BoxFuture<'static, FetchOutcome<V, E>>,
    {
        match self.pending.entry(key.to_string()) {
            Entry::Occupied(entry) => Claim::Joined(entry.get().fetch.clone()),
            Entry::Vacant(entry) => {
                if let Some(value) = check_cache() {
                    return Claim::Cached(value);
                }
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let fetch = start(id).shared();
                entry.insert(PendingRequest {
                    id,
                    fetch: fetch.clone(),
                });
                Claim::Started(fetch)
            }
        }
    }
}

impl<V, E> RequestDeduplicator<V, E> {
    /// Unregister the fetch registered as `id` under `key`.
    ///
    /// `on_finish` runs while the key is still held, so recording the outcome
    /// and removing the pending entry look like one step to [`Self::claim`].
    pub fn finish<F>(&self, key: &str, id: u64, on_finish: F)
    where
        F: FnOnce(),
    {
        match self.pending.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().id == id => {
                on_finish();
                entry.remove();
            }
            // Only the registration's own fetch removes it, so this arm means a caller
            // passed a stale id. Release builds still record the outcome.
            _ => {
                debug_assert!(false, "finish called for key {key} with unregistered id {id}");
                on_finish();
            }
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// Number of keys with a fetch outstanding
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
