//! Decoded image caching.

pub mod memory_cache;

pub use memory_cache::{CacheStats, DEFAULT_MAX_SIZE, MemoryCache};
