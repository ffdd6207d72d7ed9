//! Run configuration.
//!
//! A [`ClientConfig`] is built once per batch run, never mutated, and turned
//! into a [`GenerationClient`]. [`BatchOptions`] holds everything the batch
//! driver needs besides the client.

use crate::error::{DishGenError, Result};
use crate::finish::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::generation::transports::{GeminiModel, GeminiTransport, DEFAULT_BASE_URL};
use crate::generation::{GenerationClient, RetryPolicy, TransportKind};
use crate::pacer::DEFAULT_REQUESTS_PER_MINUTE;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables searched for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Default output root.
pub const DEFAULT_OUTPUT_DIR: &str = "temp_output";

/// Settings for the generation client.
#[derive(Clone)]
pub struct ClientConfig {
    api_key: String,
    model: GeminiModel,
    transport: TransportKind,
    base_url: String,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("transport", &self.transport)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a new `ClientConfigBuilder`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Returns the model in use.
    pub fn model(&self) -> GeminiModel {
        self.model
    }

    /// Returns the selected transport.
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Returns the retry policy.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Builds the client for this configuration.
    pub fn build_client(&self) -> Result<GenerationClient> {
        let transport = GeminiTransport::builder()
            .api_key(&self.api_key)
            .model(self.model)
            .base_url(&self.base_url)
            .timeout(self.request_timeout)
            .streaming(self.transport == TransportKind::GeminiStream)
            .build()?;
        Ok(GenerationClient::new(transport, self.retry))
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    transport: TransportKind,
    base_url: String,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: GeminiModel::default(),
            transport: TransportKind::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfigBuilder {
    /// Sets the API key. Falls back to `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Selects the transport.
    pub fn transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Overrides the API endpoint.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builds the configuration, resolving the API key.
    pub fn build(self) -> Result<ClientConfig> {
        self.build_with_env(|name| std::env::var(name).ok())
    }

    fn build_with_env(self, env: impl Fn(&str) -> Option<String>) -> Result<ClientConfig> {
        let api_key = self
            .api_key
            .or_else(|| API_KEY_ENV_VARS.iter().find_map(|name| env(name)))
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                DishGenError::Config(format!(
                    "{} not set and no API key provided",
                    API_KEY_ENV_VARS.join(" / ")
                ))
            })?;

        Ok(ClientConfig {
            api_key,
            model: self.model,
            transport: self.transport,
            base_url: self.base_url,
            request_timeout: self.request_timeout,
            retry: self.retry,
        })
    }
}

/// What to do when a dish cannot be generated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the batch at the first failed view.
    #[default]
    FailFast,
    /// Mark the dish failed and continue with the next one.
    SkipFailed,
}

/// Settings for one batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Root directory for `top_view/` and `front_view/`.
    pub output_dir: PathBuf,
    /// Request budget used for pacing.
    pub requests_per_minute: u32,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Behaviour on a failed dish.
    pub failure_policy: FailurePolicy,
    /// Whether to zip the output root when the batch is done.
    pub archive: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            failure_policy: FailurePolicy::default(),
            archive: true,
        }
    }
}

impl BatchOptions {
    /// Rejects settings that cannot produce output.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DishGenError::Config(format!(
                "output size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.requests_per_minute == 0 {
            return Err(DishGenError::Config(
                "requests per minute must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
