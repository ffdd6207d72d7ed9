//! Image generation: transports, retry policy and the retrying client.

mod client;
mod retry;
mod transport;
pub mod transports;
mod types;

pub use client::GenerationClient;
pub use retry::RetryPolicy;
pub use transport::Transport;
pub use types::{GeneratedImage, GenerationResult, ImageFormat, TransportKind};
