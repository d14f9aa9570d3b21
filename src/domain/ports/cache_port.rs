//! Port definition for the decoded image cache.

use crate::domain::entities::{Bitmap, CacheKey};

/// Decoded image cache keyed by request fingerprint.
/// Implementations must be thread-safe; hunts read it from worker tasks.
pub trait Cache: Send + Sync {
    /// Returns the cached image, promoting it as most recently used.
    fn get(&self, key: &CacheKey) -> Option<Bitmap>;

    /// Stores an image. Images larger than the cache are not retained.
    fn put(&self, key: CacheKey, bitmap: Bitmap);

    /// Removes one entry.
    fn evict(&self, key: &CacheKey);

    /// Removes every variant of `source` (all sizes, crops, transforms).
    fn evict_all_with_key_prefix(&self, source: &str);

    /// Removes all entries.
    fn clear(&self);

    /// Current resident size in bytes.
    fn size(&self) -> usize;

    /// Configured maximum size in bytes.
    fn max_size(&self) -> usize;

    /// Number of cached entries.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
