//! Core types for image generation.

use crate::error::{DishGenError, ErrorKind};
use serde::{Deserialize, Serialize};

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Maps a MIME type to a format. Parameters such as `; charset=` are ignored.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Output format for a MIME type, falling back to PNG.
    pub fn for_mime_type(mime: &str) -> Self {
        Self::from_mime_type(mime).unwrap_or_default()
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }

    pub(crate) fn as_image_format(&self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::WebP => image::ImageFormat::WebP,
        }
    }
}

/// Transport used to reach the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Gemini `generateContent`: one JSON response.
    #[default]
    Gemini,
    /// Gemini `streamGenerateContent`: server-sent event chunks.
    GeminiStream,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::GeminiStream => write!(f, "gemini-stream"),
        }
    }
}

/// Image payload returned by a single transport call.
#[derive(Debug, Clone)]
#[must_use = "generated image should be saved or processed"]
pub struct GeneratedImage {
    /// Raw image bytes, still encoded.
    pub data: Vec<u8>,
    /// MIME type the service reported.
    pub mime_type: String,
    /// Model that produced the image.
    pub model: Option<String>,
    /// Duration of the call in milliseconds.
    pub duration_ms: Option<u64>,
}

impl GeneratedImage {
    /// Creates a new generated image.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            model: None,
            duration_ms: None,
        }
    }

    /// Output format implied by the MIME type.
    pub fn format(&self) -> ImageFormat {
        ImageFormat::for_mime_type(&self.mime_type)
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Outcome of generating one prompt, after all retries.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Whether an image was obtained.
    pub success: bool,
    /// Encoded image bytes on success.
    pub image_bytes: Option<Vec<u8>>,
    /// MIME type of `image_bytes`.
    pub mime_type: Option<String>,
    /// Terminal cause on failure.
    pub error_kind: Option<ErrorKind>,
    /// Number of transport calls made.
    pub attempts: u32,
    /// Description of the last error on failure.
    pub error_message: Option<String>,
}

impl GenerationResult {
    pub(crate) fn succeeded(image: GeneratedImage, attempts: u32) -> Self {
        Self {
            success: true,
            image_bytes: Some(image.data),
            mime_type: Some(image.mime_type),
            error_kind: None,
            attempts,
            error_message: None,
        }
    }

    pub(crate) fn failed(error: &DishGenError, attempts: u32) -> Self {
        Self {
            success: false,
            image_bytes: None,
            mime_type: None,
            error_kind: Some(error.kind()),
            attempts,
            error_message: Some(error.to_string()),
        }
    }

    /// Bytes and MIME type on success, `None` on failure.
    pub fn image(&self) -> Option<(&[u8], &str)> {
        match (&self.image_bytes, &self.mime_type) {
            (Some(bytes), Some(mime)) if self.success => Some((bytes.as_slice(), mime.as_str())),
            _ => None,
        }
    }
}
