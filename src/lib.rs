#![warn(missing_docs)]
//! dishgen - batch top/front view dish images via the Gemini image API.
//!
//! Every dish gets two images: a top-down view and a seated front view. Each
//! request goes through a retrying [`GenerationClient`], paced to a fixed
//! requests-per-minute budget; every image is resized to a fixed resolution
//! and written under `top_view/` or `front_view/`, and the finished tree is
//! zipped.
//!
//! # Quick Start
//!
//! ```no_run
//! use dishgen::{BatchDriver, BatchOptions, ClientConfig, GenerationTask};
//!
//! #[tokio::main]
//! async fn main() -> dishgen::Result<()> {
//!     let client = ClientConfig::builder().build()?.build_client()?;
//!     let mut driver = BatchDriver::new(client, BatchOptions::default())?;
//!
//!     let tasks = vec![GenerationTask::new("Pasta", "A bowl of pasta")];
//!     let report = driver.run(&tasks).await?;
//!     println!("{:?}: {} files", report.state, report.outputs().count());
//!     Ok(())
//! }
//! ```
//!
//! # Input
//!
//! Spreadsheets (`.csv`, `.xlsx`, `.xls`, `.ods`) need the columns `dishes`
//! and `dish prompt`; see [`input::load_tasks`].

pub mod batch;
pub mod config;
mod error;
pub mod finish;
pub mod generation;
pub mod input;
pub mod pacer;
pub mod package;
pub mod prompt;

// Re-export error types at crate root
pub use error::{DishGenError, ErrorKind, Result};

pub use batch::{BatchDriver, BatchReport, BatchState, TaskOutcome, TaskStatus};
pub use config::{BatchOptions, ClientConfig, ClientConfigBuilder, FailurePolicy};
pub use finish::{ImageFinisher, OutputImage};
pub use generation::transports::{GeminiModel, GeminiTransport, GeminiTransportBuilder};
pub use generation::{
    GeneratedImage, GenerationClient, GenerationResult, ImageFormat, RetryPolicy, Transport,
    TransportKind,
};
pub use input::GenerationTask;
pub use pacer::Pacer;
pub use prompt::{View, ViewPrompt};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::batch::{BatchDriver, BatchReport, BatchState};
    pub use crate::config::{BatchOptions, ClientConfig, FailurePolicy};
    pub use crate::error::{DishGenError, Result};
    pub use crate::generation::{GenerationClient, RetryPolicy, Transport};
    pub use crate::input::GenerationTask;
    pub use crate::prompt::View;
}
