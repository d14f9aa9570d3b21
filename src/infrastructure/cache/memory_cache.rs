//! In-memory LRU image cache bounded by resident bytes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{Bitmap, CacheKey, byte_size};
use crate::domain::ports::Cache;

/// Default maximum resident size (64 MiB).
pub const DEFAULT_MAX_SIZE: usize = 64 * 1024 * 1024;

struct CacheState {
    entries: LruCache<CacheKey, Bitmap>,
    size: usize,
}

impl CacheState {
    fn remove(&mut self, key: &CacheKey) -> Option<Bitmap> {
        let removed = self.entries.pop(key)?;
        self.size -= byte_size(&removed);
        Some(removed)
    }
}

/// Strict LRU cache for decoded images.
/// Thread-safe; every access promotes the entry.
pub struct MemoryCache {
    state: Mutex<CacheState>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCache {
    /// Creates a cache holding at most `max_size` bytes of pixel data.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                size: 0,
            }),
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Creates a cache with the default size.
    #[must_use]
    pub fn with_default_size() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }

    /// Peeks at an entry without promoting it or touching the counters.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<Bitmap> {
        self.state.lock().entries.peek(key).cloned()
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let state = self.state.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: state.entries.len(),
            size: state.size,
            max_size: self.max_size,
        }
    }

    fn trim_to_size(&self, state: &mut CacheState) {
        while state.size > self.max_size {
            let Some((key, evicted)) = state.entries.pop_lru() else {
                break;
            };
            state.size -= byte_size(&evicted);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Evicted least recently used image");
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_default_size()
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Entries evicted to make room.
    pub evictions: u64,
    /// Current number of cached images.
    pub entries: usize,
    /// Resident bytes.
    pub size: usize,
    /// Maximum resident bytes.
    pub max_size: usize,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cache: {} images, {}/{} bytes, {:.1}% hit rate ({} hits, {} misses, {} evictions)",
            self.entries,
            self.size,
            self.max_size,
            self.hit_rate,
            self.hits,
            self.misses,
            self.evictions
        )
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Bitmap> {
        let mut state = self.state.lock();
        if let Some(bitmap) = state.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(bitmap.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    fn put(&self, key: CacheKey, bitmap: Bitmap) {
        let size = byte_size(&bitmap);
        let mut state = self.state.lock();

        if size > self.max_size {
            debug!(
                key = %key,
                size,
                max_size = self.max_size,
                "Image larger than cache, not storing"
            );
            state.remove(&key);
            return;
        }

        if let Some(previous) = state.entries.put(key, bitmap) {
            state.size -= byte_size(&previous);
        }
        state.size += size;
        self.trim_to_size(&mut state);
    }

    fn evict(&self, key: &CacheKey) {
        if self.state.lock().remove(key).is_some() {
            debug!(key = %key, "Evicted image from memory cache");
        }
    }

    fn evict_all_with_key_prefix(&self, source: &str) {
        let mut state = self.state.lock();
        let doomed: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(key, _)| key.matches_source(source))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        if !doomed.is_empty() {
            debug!(source, count = doomed.len(), "Invalidated cached variants");
        }
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.size = 0;
        debug!("Cleared memory image cache");
    }

    fn size(&self) -> usize {
        self.state.lock().size
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}
