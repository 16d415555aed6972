//! Generic TTL cache for flags-client.
//!
//! A plain key-value store where every entry carries its own insertion time
//! and time-to-live. Entries past their TTL are logically absent: they are
//! removed lazily when `get` finds them, or eagerly by `sweep`.
//!
//! Instances are fully independent; there is no shared global storage.
//!
//! The clock is `tokio::time::Instant`, so tests can run under a paused
//! runtime and drive expiry with `tokio::time::advance`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use common_cache::TtlCache;
//!
//! let mut cache: TtlCache<Vec<u8>> = TtlCache::new();
//! cache.set("key", vec![1, 2, 3], Duration::from_secs(60));
//!
//! if let Some(entry) = cache.get("key") {
//!     assert_eq!(entry.data, vec![1, 2, 3]);
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// A cached value plus the bookkeeping needed to decide freshness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<T> {
    /// The cached value.
    pub data: T,
    inserted_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// The time-to-live this entry was stored with.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// How long ago the entry was inserted (or last overwritten).
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    /// An entry is valid iff its elapsed time is strictly below its TTL, so
    /// a zero TTL expires immediately.
    pub fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// Key-to-entry store with per-entry expiry.
#[derive(Debug)]
pub struct TtlCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
}

impl<T> TtlCache<T> {
    pub fn new() -> TtlCache<T> {
        TtlCache {
            entries: HashMap::new(),
        }
    }

    /// Returns the entry for `key` when present **and** unexpired.
    ///
    /// An entry found expired is deleted as a side effect, so a repeated
    /// call on the same key returns `None` without re-checking staleness.
    pub fn get(&mut self, key: &str) -> Option<&CacheEntry<T>> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    /// Inserts or overwrites unconditionally. The insertion timestamp is
    /// captured at call time; overwriting restarts the TTL countdown and
    /// discards the earlier one.
    pub fn set(&mut self, key: impl Into<String>, data: T, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                data,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Removes every entry whose elapsed time has reached its TTL. Safe to
    /// call on an empty store.
    pub fn sweep(&mut self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` is physically present in the store, expired or not.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
