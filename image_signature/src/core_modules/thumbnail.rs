// THEORY:
// Image acquisition is an external collaborator. The extractor only needs "a
// decoded RGBA buffer of known size", which is what `ImageSource` promises.
//
// Signatures are always computed on a thumbnail, not the full-resolution image:
// sampling cost stays constant and texture windows cover a comparable fraction
// of every image. The sizing rule, when the aspect ratio is kept, fits the image
// to the configured width unless that would overflow the configured height, in
// which case it fits the height instead.

use crate::config::ThumbnailConfig;
use crate::core_modules::pixel::PixelBuffer;
use crate::error::ImageSourceError;
use image::DynamicImage;
use image::imageops::{self, FilterType};
use std::path::{Path, PathBuf};

/// Anything that can hand the extractor a decoded pixel buffer.
pub trait ImageSource {
    fn load(&self) -> Result<PixelBuffer, ImageSourceError>;
}

impl ImageSource for PixelBuffer {
    fn load(&self) -> Result<PixelBuffer, ImageSourceError> {
        Ok(self.clone())
    }
}

fn scale(value: u32, numerator: u32, denominator: u32) -> u32 {
    ((value as f64 * numerator as f64 / denominator as f64).round() as u32).max(1)
}

/// Thumbnail dimensions for a `width` x `height` source image.
pub fn thumbnail_size(width: u32, height: u32, config: &ThumbnailConfig) -> (u32, u32) {
    if !config.keep_aspect_ratio || width == 0 || height == 0 {
        return (config.width, config.height);
    }
    if scale(height, config.width, width) > config.height {
        (scale(width, config.height, height), config.height)
    } else {
        (config.width, scale(height, config.width, width))
    }
}

/// Resizes a decoded image to its thumbnail and wraps it as a `PixelBuffer`.
pub fn thumbnail_from_image(image: &DynamicImage, config: &ThumbnailConfig) -> Result<PixelBuffer, ImageSourceError> {
    let (width, height) = thumbnail_size(image.width(), image.height(), config);
    let resized = imageops::resize(&image.to_rgba8(), width, height, FilterType::Triangle);
    Ok(PixelBuffer::new(width, height, resized.into_raw())?)
}

/// Decodes an image file from disk and reduces it to a thumbnail.
#[derive(Debug, Clone)]
pub struct FileImageSource {
    path: PathBuf,
    thumbnail: ThumbnailConfig,
}

impl FileImageSource {
    pub fn new(path: impl Into<PathBuf>, thumbnail: ThumbnailConfig) -> Self {
        Self {
            path: path.into(),
            thumbnail,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ImageSource for FileImageSource {
    fn load(&self) -> Result<PixelBuffer, ImageSourceError> {
        let decoded = image::open(&self.path)?;
        thumbnail_from_image(&decoded, &self.thumbnail)
    }
}
