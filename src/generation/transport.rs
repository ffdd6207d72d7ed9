//! Transport trait: one request to the generation service, no retries.

use crate::error::Result;
use crate::generation::types::{GeneratedImage, TransportKind};
use async_trait::async_trait;

/// A way of turning prompt text into image bytes.
///
/// Implementations make exactly one attempt per call. Errors that carry a
/// service-suggested wait expose it through
/// [`DishGenError::suggested_delay`](crate::DishGenError::suggested_delay).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one prompt and returns the first image in the answer.
    async fn send(&self, prompt: &str) -> Result<GeneratedImage>;

    /// Returns the kind of this transport.
    fn kind(&self) -> TransportKind;

    /// Returns the name of this transport for display.
    fn name(&self) -> &str {
        match self.kind() {
            TransportKind::Gemini => "Gemini (generateContent)",
            TransportKind::GeminiStream => "Gemini (streamGenerateContent)",
        }
    }
}
