//! Pipeline counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::entities::byte_size;

/// Lock-free event counters shared by the dispatcher, hunts and handlers.
#[derive(Debug, Default)]
pub struct Stats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    downloads: AtomicU64,
    downloaded_bytes: AtomicU64,
    decoded: AtomicU64,
    decoded_bytes: AtomicU64,
    transformed: AtomicU64,
    transformed_bytes: AtomicU64,
}

impl Stats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a memory cache hit.
    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a memory cache miss.
    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a finished download of `bytes` bytes.
    pub fn download_finished(&self, bytes: u64) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
        self.downloaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a decoded image.
    pub fn bitmap_decoded(&self, image: &image::DynamicImage) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
        self.decoded_bytes
            .fetch_add(byte_size(image) as u64, Ordering::Relaxed);
    }

    /// Records a transformed image.
    pub fn bitmap_transformed(&self, image: &image::DynamicImage) {
        self.transformed.fetch_add(1, Ordering::Relaxed);
        self.transformed_bytes
            .fetch_add(byte_size(image) as u64, Ordering::Relaxed);
    }

    /// Captures the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            downloaded_bytes: self.downloaded_bytes.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            decoded_bytes: self.decoded_bytes.load(Ordering::Relaxed),
            transformed: self.transformed.load(Ordering::Relaxed),
            transformed_bytes: self.transformed_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Memory cache hits.
    pub cache_hits: u64,
    /// Memory cache misses.
    pub cache_misses: u64,
    /// Finished network downloads.
    pub downloads: u64,
    /// Bytes downloaded.
    pub downloaded_bytes: u64,
    /// Images decoded.
    pub decoded: u64,
    /// Bytes of decoded pixel data.
    pub decoded_bytes: u64,
    /// Images transformed.
    pub transformed: u64,
    /// Bytes of transformed pixel data.
    pub transformed_bytes: u64,
}

impl StatsSnapshot {
    /// Fraction of cache lookups that hit, 0.0 when nothing was looked up.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Mean download size in bytes.
    #[must_use]
    pub const fn average_download_size(&self) -> u64 {
        average(self.downloaded_bytes, self.downloads)
    }

    /// Mean decoded image size in bytes.
    #[must_use]
    pub const fn average_decoded_size(&self) -> u64 {
        average(self.decoded_bytes, self.decoded)
    }

    /// Mean transformed image size in bytes.
    #[must_use]
    pub const fn average_transformed_size(&self) -> u64 {
        average(self.transformed_bytes, self.transformed)
    }
}

const fn average(total: u64, count: u64) -> u64 {
    if count == 0 { 0 } else { total / count }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cache hits: {}", self.cache_hits)?;
        writeln!(
            f,
            "Cache misses: {} (hit rate {:.1}%)",
            self.cache_misses,
            self.hit_rate() * 100.0
        )?;
        writeln!(
            f,
            "Downloads: {} ({} bytes, avg {})",
            self.downloads,
            self.downloaded_bytes,
            self.average_download_size()
        )?;
        writeln!(
            f,
            "Decoded: {} (avg {} bytes)",
            self.decoded,
            self.average_decoded_size()
        )?;
        write!(
            f,
            "Transformed: {} (avg {} bytes)",
            self.transformed,
            self.average_transformed_size()
        )
    }
}
