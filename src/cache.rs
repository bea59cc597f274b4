//! # Dedup Cache
//! Bounded set of digests for activities that were already forwarded.
//!
//! Eviction follows *insertion* order only. `contains` must never refresh an
//! entry: with a read-refreshing LRU, an activity that the feed keeps
//! returning inside the lookback window would pin its slot forever and push
//! out younger digests instead. Keep lookups on `LruCache::contains`/`peek`,
//! never `get`.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::error::ConfigError;

/// First-seen set of digests with a fixed capacity.
///
/// Single owner by construction (the poll loop task), so no internal locking.
pub struct DedupCache {
    inner: LruCache<String, ()>,
}

impl std::fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupCache")
            .field("len", &self.inner.len())
            .field("cap", &self.inner.cap())
            .finish()
    }
}

impl DedupCache {
    /// `capacity` must be > 0.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        let cap = NonZeroUsize::new(capacity).ok_or(ConfigError::Invalid {
            name: "LRU_CACHE_SIZE",
            reason: "cache capacity must be greater than zero".to_string(),
        })?;
        Ok(Self {
            inner: LruCache::new(cap),
        })
    }

    /// Presence check. Does not touch eviction order, hit or miss.
    pub fn contains(&self, digest: &str) -> bool {
        self.inner.contains(digest)
    }

    /// Mark `digest` as forwarded, evicting the oldest insertion when full.
    /// Re-adding a present digest moves it to the newest position.
    pub fn add(&mut self, digest: String) {
        self.inner.put(digest, ());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }
}
