//! Byte decoding shared by the built-in handlers.

use std::io::Cursor;

use bytes::Bytes;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use tracing::trace;

use crate::domain::errors::{LoadError, LoadResult};

/// Decodes `bytes` on the blocking pool.
///
/// Returns the image and its EXIF orientation tag (0 when the payload
/// carries none or it is the identity).
///
/// # Errors
/// Returns `LoadError::Decode` if the format is unknown or the data is
/// corrupt.
pub async fn decode(bytes: Bytes) -> LoadResult<(DynamicImage, u8)> {
    tokio::task::spawn_blocking(move || decode_blocking(&bytes))
        .await
        .map_err(|e| LoadError::decode(format!("Decode task panicked: {e}")))?
}

fn decode_blocking(bytes: &[u8]) -> LoadResult<(DynamicImage, u8)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let mut decoder = reader.into_decoder()?;
    let orientation = match decoder.orientation() {
        Ok(Orientation::NoTransforms) | Err(_) => 0,
        Ok(orientation) => orientation.to_exif(),
    };
    let image = DynamicImage::from_decoder(decoder)?;
    trace!(
        width = image.width(),
        height = image.height(),
        orientation,
        "Decoded image"
    );
    Ok((image, orientation))
}

#[cfg(test)]
pub(crate) fn encode_png(image: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Png)
        .expect("png encoding");
    buf.into_inner()
}
