//! Decoding, resizing and writing generated images.

use crate::error::{DishGenError, Result};
use crate::generation::ImageFormat;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Default output width in pixels.
pub const DEFAULT_WIDTH: u32 = 1080;
/// Default output height in pixels.
pub const DEFAULT_HEIGHT: u32 = 550;

/// An image written to disk at its final resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputImage {
    /// Absolute or root-joined path of the written file.
    pub path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Encoding of the file.
    pub format: ImageFormat,
}

/// Resizes images to a fixed resolution and saves them.
#[derive(Debug, Clone, Copy)]
pub struct ImageFinisher {
    width: u32,
    height: u32,
    filter: FilterType,
}

impl Default for ImageFinisher {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl ImageFinisher {
    /// Creates a finisher with the given target size and Lanczos resampling.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            filter: FilterType::Lanczos3,
        }
    }

    /// Target resolution as `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Decodes `bytes`, stretches them to the target size and writes the
    /// result to `stem` plus the extension for `mime_type`.
    ///
    /// Parent directories are created and an existing file is replaced.
    pub fn save(&self, bytes: &[u8], mime_type: &str, stem: &Path) -> Result<OutputImage> {
        let format = ImageFormat::for_mime_type(mime_type);
        let decoded = image::load_from_memory(bytes)?;
        tracing::debug!(
            from_width = decoded.width(),
            from_height = decoded.height(),
            to_width = self.width,
            to_height = self.height,
            "resizing"
        );

        let resized = decoded.resize_exact(self.width, self.height, self.filter);
        let resized = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
            ImageFormat::WebP => DynamicImage::ImageRgba8(resized.to_rgba8()),
            ImageFormat::Png => resized,
        };

        let path = with_extension(stem, format);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        resized
            .save_with_format(&path, format.as_image_format())
            .map_err(|e| match e {
                image::ImageError::IoError(io) => DishGenError::Io(io),
                other => DishGenError::ImageDecode(other),
            })?;
        tracing::info!(path = %path.display(), "image saved");

        Ok(OutputImage {
            path,
            width: self.width,
            height: self.height,
            format,
        })
    }
}

/// Appends the format's extension without replacing dots already in the stem.
fn with_extension(stem: &Path, format: ImageFormat) -> PathBuf {
    let mut path = stem.as_os_str().to_owned();
    path.push(".");
    path.push(format.extension());
    PathBuf::from(path)
}
