//! In-flight request coalescing (singleflight).
//!
//! Concurrent fetches for the same cache key collapse into one upstream
//! call: the first caller installs a shared future and owns the fetch,
//! later callers clone and await the same future. The entry is removed
//! inside the owning future as its final act, so a caller arriving after
//! completion can never attach to a stale entry.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::future::Future;
use std::sync::Arc;

type SharedResult<T> = Shared<BoxFuture<'static, T>>;

/// Map of in-flight fetches keyed by normalized URL.
pub struct InFlightMap<T: Clone> {
    map: Arc<DashMap<String, SharedResult<T>>>,
}

impl<T> InFlightMap<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            map: Arc::new(DashMap::new()),
        }
    }

    /// Join the in-flight fetch for `key`, or install `fetch` as the owner.
    ///
    /// The owning future is driven by a spawned task, so a waiter dropping
    /// its handle never cancels the shared fetch for the others (and the
    /// fetch completes even if every caller gives up).
    pub fn join<F>(&self, key: &str, fetch: F) -> SharedResult<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        match self.map.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let map = self.map.clone();
                let owned_key = key.to_string();
                let shared = async move {
                    let result = fetch.await;
                    // Removal is the last act before the shared future
                    // resolves; no caller can observe a completed entry.
                    map.remove(&owned_key);
                    result
                }
                .boxed()
                .shared();

                entry.insert(shared.clone());
                tokio::spawn(shared.clone());
                shared
            }
        }
    }

    /// Number of fetches currently in flight.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for InFlightMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
