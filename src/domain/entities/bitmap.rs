//! Decoded image artifacts and their provenance.

use std::fmt;
use std::sync::Arc;

use image::DynamicImage;

/// Shared decoded image handed to the cache and to every consumer of a hunt.
pub type Bitmap = Arc<DynamicImage>;

/// Number of bytes of pixel data held by a decoded image.
#[must_use]
pub fn byte_size(image: &DynamicImage) -> usize {
    image.as_bytes().len()
}

/// Returns true if the image no longer holds pixel data.
///
/// A zero-area image is what a transformation hands back after it has
/// released the buffer it was given.
#[must_use]
pub fn is_released(image: &DynamicImage) -> bool {
    image.width() == 0 || image.height() == 0
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadedFrom {
    /// Served from the in-memory LRU cache.
    Memory,
    /// Read from local storage.
    Disk,
    /// Downloaded from the network.
    Network,
}

impl fmt::Display for LoadedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Output of a request handler: a decoded image plus attribution.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Decoded image before any transformation.
    pub image: DynamicImage,
    /// Where the bytes came from.
    pub loaded_from: LoadedFrom,
    /// EXIF orientation tag (1-8), or 0 when the payload carries none.
    pub exif_orientation: u8,
}

impl FetchResult {
    /// Creates a result without orientation metadata.
    #[must_use]
    pub const fn new(image: DynamicImage, loaded_from: LoadedFrom) -> Self {
        Self {
            image,
            loaded_from,
            exif_orientation: 0,
        }
    }

    /// Sets the EXIF orientation tag.
    #[must_use]
    pub const fn with_exif_orientation(mut self, orientation: u8) -> Self {
        self.exif_orientation = orientation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_rgba() {
        let image = DynamicImage::new_rgba8(10, 4);
        assert_eq!(byte_size(&image), 160);
    }

    #[test]
    fn test_released_detection() {
        assert!(is_released(&DynamicImage::new_rgb8(0, 0)));
        assert!(is_released(&DynamicImage::new_rgb8(5, 0)));
        assert!(!is_released(&DynamicImage::new_rgb8(1, 1)));
    }
}
