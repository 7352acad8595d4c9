//! TTL cache store for upstream response bodies.

use axum::body::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::observability::metrics;

/// A cached upstream response body.
#[derive(Debug, Clone)]
pub struct CachedBody {
    /// Upstream HTTP status.
    pub status: u16,
    /// Content-Type header of the upstream response, if any.
    pub content_type: Option<String>,
    /// Raw response body.
    pub body: Bytes,
}

/// A single cache entry with its expiry bookkeeping.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedBody,
    fetched_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Aggregate cache counters for /proxy/health and /proxy/stats.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries still within their TTL.
    pub valid: usize,
    /// Entries past expiry that have not been swept yet.
    pub expired: usize,
    /// Total entries held.
    pub total: usize,
}

/// A thread-safe TTL cache keyed by normalized URL.
///
/// Reads treat an entry past `expires_at` as a miss but leave it in place,
/// so stats can distinguish "expired but not yet swept" from "valid".
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl CacheStore {
    /// Create an empty store with the given default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Look up a key. Expired entries are misses but are not removed here.
    pub fn get(&self, key: &str) -> Option<CachedBody> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Insert or overwrite an entry. `ttl` falls back to the default.
    pub fn set(&self, key: &str, value: CachedBody, ttl: Option<Duration>) {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                fetched_at: now,
                expires_at: now + ttl,
            },
        );
        metrics::record_cache_size(self.entries.len());
    }

    /// Age of the entry under `key`, if present and valid.
    pub fn age(&self, key: &str) -> Option<Duration> {
        let entry = self.entries.get(key)?;
        let now = Instant::now();
        if entry.is_expired(now) {
            return None;
        }
        Some(now - entry.fetched_at)
    }

    /// Remove one entry, or every entry when `key` is `None`.
    /// Returns the number of entries removed.
    pub fn invalidate(&self, key: Option<&str>) -> usize {
        match key {
            Some(key) => {
                let removed = self.entries.remove(key).is_some();
                metrics::record_cache_size(self.entries.len());
                usize::from(removed)
            }
            None => {
                let cleared = self.entries.len();
                self.entries.clear();
                metrics::record_cache_size(0);
                cleared
            }
        }
    }

    /// Drop every expired entry. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Swept expired cache entries");
            metrics::record_cache_size(self.entries.len());
        }
        evicted
    }

    /// Count valid, expired, and total entries.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut valid = 0;
        let mut expired = 0;
        for entry in self.entries.iter() {
            if entry.is_expired(now) {
                expired += 1;
            } else {
                valid += 1;
            }
        }
        CacheStats {
            valid,
            expired,
            total: valid + expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(s: &str) -> CachedBody {
        CachedBody {
            status: 200,
            content_type: Some("application/json".into()),
            body: Bytes::from(s.to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl_then_miss_after_expiry() {
        let store = CacheStore::new(Duration::from_secs(60));
        store.set("a", body("1"), None);

        let hit = store.get("a").expect("fresh entry should hit");
        assert_eq!(hit.body, Bytes::from_static(b"1"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.get("a").is_none(), "entry past TTL must miss");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_counted_until_swept() {
        let store = CacheStore::new(Duration::from_secs(10));
        store.set("a", body("1"), None);
        store.set("b", body("2"), Some(Duration::from_secs(120)));

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(
            store.stats(),
            CacheStats { valid: 1, expired: 1, total: 2 }
        );

        assert_eq!(store.sweep(), 1);
        assert_eq!(
            store.stats(),
            CacheStats { valid: 1, expired: 0, total: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn age_tracks_time_since_fetch() {
        let store = CacheStore::new(Duration::from_secs(60));
        store.set("a", body("1"), None);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.age("a"), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(51)).await;
        assert_eq!(store.age("a"), None, "expired entries have no age");
        assert_eq!(store.age("missing"), None);
    }

    #[tokio::test]
    async fn invalidate_single_key() {
        let store = CacheStore::new(Duration::from_secs(60));
        store.set("a", body("1"), None);
        store.set("b", body("2"), None);

        assert_eq!(store.invalidate(Some("a")), 1);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());

        // Removing a missing key is a no-op.
        assert_eq!(store.invalidate(Some("a")), 0);
    }

    #[tokio::test]
    async fn invalidate_all_clears_everything() {
        let store = CacheStore::new(Duration::from_secs(60));
        store.set("a", body("1"), None);
        store.set("b", body("2"), None);

        assert_eq!(store.invalidate(None), 2);
        assert_eq!(store.stats().total, 0);
    }

    #[tokio::test]
    async fn overwrite_refreshes_value() {
        let store = CacheStore::new(Duration::from_secs(60));
        store.set("a", body("old"), None);
        store.set("a", body("new"), None);
        assert_eq!(store.get("a").unwrap().body, Bytes::from_static(b"new"));
    }
}
