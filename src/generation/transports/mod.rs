//! Transports to the image generation service.

mod gemini;
mod sse;

pub use gemini::{GeminiModel, GeminiTransport, GeminiTransportBuilder, DEFAULT_BASE_URL};
