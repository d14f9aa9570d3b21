//! Orientation, resize, crop, rotation and pixel format step.
//!
//! Runs ahead of any caller supplied transformation whenever the request
//! asks for geometry changes or the payload carries a non-identity EXIF
//! orientation.

use image::DynamicImage;
use image::imageops::FilterType;
use tracing::warn;

use crate::domain::entities::{Alignment, Fit, PixelFormat, Request, Rotation};
use crate::domain::ports::Transformation;

const FILTER: FilterType = FilterType::Lanczos3;

/// Geometry derived from a request plus the decoded EXIF orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryTransformation {
    exif_orientation: u8,
    target_width: u32,
    target_height: u32,
    fit: Fit,
    only_scale_down: bool,
    rotation: Option<Rotation>,
    pixel_format: Option<PixelFormat>,
}

impl GeometryTransformation {
    /// Captures the geometry of `request`.
    #[must_use]
    pub fn new(request: &Request, exif_orientation: u8) -> Self {
        Self {
            exif_orientation,
            target_width: request.target_width(),
            target_height: request.target_height(),
            fit: request.fit(),
            only_scale_down: request.only_scale_down(),
            rotation: request.rotation(),
            pixel_format: request.pixel_format(),
        }
    }

    /// Returns true if applying this step would change anything.
    #[must_use]
    pub fn is_needed(request: &Request, exif_orientation: u8) -> bool {
        request.needs_geometry_transform() || exif_orientation > 1
    }

    fn resize(&self, image: DynamicImage) -> DynamicImage {
        let (width, height) = (image.width(), image.height());
        let (tw, th) = (self.target_width, self.target_height);
        if tw == 0 && th == 0 {
            return image;
        }

        if self.only_scale_down {
            let too_wide = tw != 0 && width > tw;
            let too_tall = th != 0 && height > th;
            if !too_wide && !too_tall {
                return image;
            }
        }

        match self.fit {
            Fit::CenterCrop(alignment) if tw != 0 && th != 0 => {
                let (x, y, cw, ch) = crop_window(width, height, tw, th, alignment);
                image.crop_imm(x, y, cw, ch).resize_exact(tw, th, FILTER)
            }
            Fit::CenterInside | Fit::CenterCrop(_) => image.resize(
                if tw == 0 { u32::MAX } else { tw },
                if th == 0 { u32::MAX } else { th },
                FILTER,
            ),
            Fit::None if tw == 0 || th == 0 => image.resize(
                if tw == 0 { u32::MAX } else { tw },
                if th == 0 { u32::MAX } else { th },
                FILTER,
            ),
            Fit::None => image.resize_exact(tw, th, FILTER),
        }
    }
}

/// Source window whose aspect ratio matches the target.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn crop_window(
    width: u32,
    height: u32,
    target_width: u32,
    target_height: u32,
    alignment: Alignment,
) -> (u32, u32, u32, u32) {
    let width_ratio = f64::from(target_width) / f64::from(width);
    let height_ratio = f64::from(target_height) / f64::from(height);

    if width_ratio > height_ratio {
        let new_height = ((f64::from(height) * height_ratio / width_ratio).ceil() as u32)
            .clamp(1, height);
        let y = match alignment {
            Alignment::Top => 0,
            Alignment::Bottom => height - new_height,
            _ => (height - new_height) / 2,
        };
        (0, y, width, new_height)
    } else if width_ratio < height_ratio {
        let new_width =
            ((f64::from(width) * width_ratio / height_ratio).ceil() as u32).clamp(1, width);
        let x = match alignment {
            Alignment::Left => 0,
            Alignment::Right => width - new_width,
            _ => (width - new_width) / 2,
        };
        (x, 0, new_width, height)
    } else {
        (0, 0, width, height)
    }
}

fn apply_exif_orientation(image: DynamicImage, orientation: u8) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Rotates by the nearest quarter turn.
///
/// Pivots do not affect quarter turns, the output is always re-centered.
#[allow(clippy::cast_possible_truncation)]
fn rotate(image: DynamicImage, rotation: Rotation) -> DynamicImage {
    let quarters = (rotation.degrees / 90.0).round();
    if (quarters * 90.0 - rotation.degrees).abs() > f32::EPSILON {
        warn!(
            degrees = rotation.degrees,
            applied = quarters * 90.0,
            "Rotation rounded to the nearest quarter turn"
        );
    }
    match (quarters as i32).rem_euclid(4) {
        1 => image.rotate90(),
        2 => image.rotate180(),
        3 => image.rotate270(),
        _ => image,
    }
}

fn convert(image: DynamicImage, format: PixelFormat) -> DynamicImage {
    match format {
        PixelFormat::Rgba8 => DynamicImage::ImageRgba8(image.into_rgba8()),
        PixelFormat::Rgb8 => DynamicImage::ImageRgb8(image.into_rgb8()),
        PixelFormat::Luma8 => DynamicImage::ImageLuma8(image.into_luma8()),
        PixelFormat::LumaA8 => DynamicImage::ImageLumaA8(image.into_luma_alpha8()),
    }
}

impl Transformation for GeometryTransformation {
    fn transform(&self, source: DynamicImage) -> DynamicImage {
        let mut image = apply_exif_orientation(source, self.exif_orientation);
        image = self.resize(image);
        if let Some(rotation) = self.rotation {
            image = rotate(image, rotation);
        }
        if let Some(format) = self.pixel_format {
            image = convert(image, format);
        }
        image
    }

    fn key(&self) -> String {
        "geometry".to_string()
    }
}
