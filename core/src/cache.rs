use crate::SearchHit;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

type CacheKey = (String, usize);

struct CachedResult {
    generation: u64,
    hits: Vec<SearchHit>,
}

/// LRU cache of ranked answers keyed by (normalized query, requested result count).
///
/// Every entry remembers the index generation it was computed against. A lookup with a
/// different generation is a miss and evicts the entry, so a rebuild or update can never
/// leave stale answers visible.
pub struct QueryCache {
    entries: Mutex<LruCache<CacheKey, CachedResult>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// `None` for a zero capacity, i.e. caching disabled.
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        NonZeroUsize::new(capacity).map(Self::new)
    }

    pub fn get(&self, query: &str, limit: usize, generation: u64) -> Option<Vec<SearchHit>> {
        let key = (query.to_string(), limit);
        let mut entries = self.entries.lock();
        let fresh = match entries.peek(&key) {
            Some(entry) => entry.generation == generation,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if !fresh {
            entries.pop(&key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(query, limit, generation, "dropped stale cache entry");
            return None;
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        entries.get(&key).map(|entry| entry.hits.clone())
    }

    /// Stores an answer. An answer from an older generation never replaces a newer one.
    pub fn put(&self, query: String, limit: usize, generation: u64, hits: Vec<SearchHit>) {
        let key = (query, limit);
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.peek(&key) {
            if existing.generation > generation {
                return;
            }
        }
        entries.put(key, CachedResult { generation, hits });
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize { self.entries.lock().len() }

    pub fn is_empty(&self) -> bool { self.entries.lock().is_empty() }

    pub fn capacity(&self) -> usize { self.entries.lock().cap().get() }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}
