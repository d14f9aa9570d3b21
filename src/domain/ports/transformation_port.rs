//! Port definition for custom image transformations.

use image::DynamicImage;

/// Pure function over one decoded image.
///
/// `key` participates in the cache key, so two transformations producing
/// different output must report different keys. Panicking or returning a
/// released (zero-area) image is a fatal contract violation.
pub trait Transformation: Send + Sync {
    /// Produces the transformed image.
    fn transform(&self, source: DynamicImage) -> DynamicImage;

    /// Non-empty key identifying this transformation and its parameters.
    fn key(&self) -> String;
}
