//! Error types for batch dish image generation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest error body kept in a message before truncation.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while generating a batch of dish images.
#[derive(Debug, thiserror::Error)]
pub enum DishGenError {
    /// Missing credential or invalid settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required spreadsheet column is absent.
    #[error("missing column: {column:?}")]
    MissingColumn { column: String },

    /// Input data could not be parsed or contains unusable rows.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// API key rejected by the service.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// The service answered but the answer carried no image.
    #[error("empty response: {0}")]
    EmptyResponse(String),

    /// Prompt or output was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The service rejected the request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request did not finish in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 payload data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// Returned bytes could not be decoded, resized or re-encoded.
    #[error("image error: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zip archive could not be written.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Terminal cause reported for a generation that exhausted its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The service kept answering with 429.
    RateLimited,
    /// The service kept failing with 5xx.
    ServerError,
    /// The service answered without usable image data.
    EmptyResponse,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServerError => write!(f, "server_error"),
            Self::EmptyResponse => write!(f, "empty_response"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl DishGenError {
    /// Delay the service asked for before the next attempt, if it named one.
    pub fn suggested_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classifies the error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Api { status, .. } if *status >= 500 => ErrorKind::ServerError,
            Self::EmptyResponse(_) | Self::Decode(_) | Self::Json(_) => ErrorKind::EmptyResponse,
            _ => ErrorKind::Unknown,
        }
    }
}

/// Reads a `Retry-After` header given in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Reads the `retryDelay` of a `google.rpc.RetryInfo` detail in an error body.
///
/// The delay is a protobuf duration string such as `"37s"` or `"1.5s"`.
pub(crate) fn parse_retry_delay(body: &str) -> Option<Duration> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let details = value.get("error")?.get("details")?.as_array()?;

    details.iter().find_map(|detail| {
        let kind = detail.get("@type")?.as_str()?;
        if !kind.ends_with("google.rpc.RetryInfo") {
            return None;
        }
        let raw = detail.get("retryDelay")?.as_str()?;
        let secs: f64 = raw.strip_suffix('s')?.parse().ok()?;
        (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
    })
}

/// Shortens an error body and strips anything that looks like an API key.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("error")?.get("message")?.as_str().map(String::from))
        .unwrap_or_else(|| text.trim().to_string());

    let redacted: Vec<String> = message
        .split_whitespace()
        .map(|word| {
            if word.starts_with("AIza") || word.contains("key=") {
                "[redacted]".to_string()
            } else {
                word.to_string()
            }
        })
        .collect();
    let mut message = redacted.join(" ");

    if message.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push_str("...");
    }
    message
}

/// Result type alias for dish generation operations.
pub type Result<T> = std::result::Result<T, DishGenError>;
