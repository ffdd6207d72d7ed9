//! Gemini (Google) image generation transport.

use crate::error::{
    parse_retry_after, parse_retry_delay, sanitize_error_message, DishGenError, Result,
};
use crate::generation::transport::Transport;
use crate::generation::transports::sse::SseParser;
use crate::generation::types::{GeneratedImage, ImageFormat, TransportKind};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default endpoint of the Gemini API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeminiModel {
    /// Gemini 2.0 Flash experimental image generation.
    Flash2Exp,
    /// Nano Banana - Gemini 2.5 Flash Image (fast, economical).
    #[default]
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image (highest quality).
    NanoBananaPro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flash2Exp => "gemini-2.0-flash-exp-image-generation",
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "nano-banana-pro-preview",
        }
    }

    /// Output modalities the model must be asked for.
    fn response_modalities(&self) -> Vec<String> {
        match self {
            // The experimental model refuses image-only output.
            Self::Flash2Exp => vec!["TEXT".into(), "IMAGE".into()],
            Self::NanoBanana | Self::NanoBananaPro => vec!["IMAGE".into()],
        }
    }
}

/// Builder for GeminiTransport.
#[derive(Debug, Clone)]
pub struct GeminiTransportBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    base_url: String,
    streaming: bool,
    timeout: Duration,
}

impl Default for GeminiTransportBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: GeminiModel::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            streaming: false,
            timeout: Duration::from_secs(120),
        }
    }
}

impl GeminiTransportBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the API endpoint, e.g. for a proxy.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Uses `streamGenerateContent` instead of `generateContent`.
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the transport.
    pub fn build(self) -> Result<GeminiTransport> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| DishGenError::Config("Gemini API key not provided".into()))?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        Ok(GeminiTransport {
            client,
            api_key,
            model: self.model,
            base_url: self.base_url,
            streaming: self.streaming,
            timeout: self.timeout,
        })
    }
}

/// Gemini image generation transport.
pub struct GeminiTransport {
    client: reqwest::Client,
    api_key: String,
    model: GeminiModel,
    base_url: String,
    streaming: bool,
    timeout: Duration,
}

impl GeminiTransport {
    /// Creates a new `GeminiTransportBuilder`.
    pub fn builder() -> GeminiTransportBuilder {
        GeminiTransportBuilder::new()
    }

    /// Returns the model in use.
    pub fn model(&self) -> GeminiModel {
        self.model
    }

    fn endpoint(&self) -> String {
        if self.streaming {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url,
                self.model.as_str()
            )
        } else {
            format!(
                "{}/models/{}:generateContent",
                self.base_url,
                self.model.as_str()
            )
        }
    }

    async fn post(&self, prompt: &str) -> Result<reqwest::Response> {
        let body = GeminiRequest::new(prompt, self.model);
        tracing::debug!(url = %self.endpoint(), prompt_len = prompt.len(), "posting prompt");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }
        Ok(response)
    }

    fn map_send_error(&self, e: reqwest::Error) -> DishGenError {
        if e.is_timeout() {
            DishGenError::Timeout(self.timeout)
        } else {
            DishGenError::Network(e)
        }
    }

    async fn generate_single(&self, prompt: &str) -> Result<InlineData> {
        let body = self
            .post(prompt)
            .await?
            .text()
            .await
            .map_err(|e| self.map_send_error(e))?;
        parse_response(&body)
    }

    async fn generate_streaming(&self, prompt: &str) -> Result<InlineData> {
        let stream = self
            .post(prompt)
            .await?
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| self.map_send_error(e)));
        first_streamed_image(stream).await
    }
}

/// Parses a complete `generateContent` body into its first image.
fn parse_response(body: &str) -> Result<InlineData> {
    let response: GeminiResponse = serde_json::from_str(body)?;
    extract_image(response)?
        .ok_or_else(|| DishGenError::EmptyResponse("No image data in Gemini response".into()))
}

/// Reads SSE bytes until a chunk carries an image.
async fn first_streamed_image<S>(stream: S) -> Result<InlineData>
where
    S: Stream<Item = Result<Bytes>>,
{
    futures::pin_mut!(stream);
    let mut parser = SseParser::default();
    let mut chunks = 0usize;

    while let Some(bytes) = stream.next().await {
        for data in parser.process(&bytes?) {
            chunks += 1;
            if let Some(image) = parse_chunk(&data, chunks)? {
                return Ok(image);
            }
        }
    }
    if let Some(data) = parser.finish() {
        chunks += 1;
        if let Some(image) = parse_chunk(&data, chunks)? {
            return Ok(image);
        }
    }

    Err(DishGenError::EmptyResponse(format!(
        "Gemini stream ended after {chunks} chunks without image data"
    )))
}

#[async_trait]
impl Transport for GeminiTransport {
    async fn send(&self, prompt: &str) -> Result<GeneratedImage> {
        let start = Instant::now();

        let inline = if self.streaming {
            self.generate_streaming(prompt).await?
        } else {
            self.generate_single(prompt).await?
        };

        let data = base64::engine::general_purpose::STANDARD
            .decode(inline.data.trim())
            .map_err(|e| DishGenError::Decode(e.to_string()))?;
        if data.is_empty() {
            return Err(DishGenError::EmptyResponse("Gemini returned an empty image".into()));
        }

        let mime_type = if inline.mime_type.trim().is_empty() {
            ImageFormat::from_magic_bytes(&data)
                .map(|f| f.mime_type())
                .unwrap_or_default()
                .to_string()
        } else {
            inline.mime_type
        };

        let mut image = GeneratedImage::new(data, mime_type);
        image.model = Some(self.model.as_str().to_string());
        image.duration_ms = Some(start.elapsed().as_millis() as u64);
        Ok(image)
    }

    fn kind(&self) -> TransportKind {
        if self.streaming {
            TransportKind::GeminiStream
        } else {
            TransportKind::Gemini
        }
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> DishGenError {
    if status == 429 {
        let retry_after = parse_retry_after(headers)
            .map(Duration::from_secs)
            .or_else(|| parse_retry_delay(text));
        return DishGenError::RateLimited { retry_after };
    }
    let text = sanitize_error_message(text);
    match status {
        401 | 403 => DishGenError::Auth(text),
        404 => DishGenError::InvalidRequest(format!(
            "Model not found. Verify the model name is correct. ({text})"
        )),
        s if s >= 500 => DishGenError::Api { status, message: text },
        _ => {
            let lower = text.to_lowercase();
            if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited")
            {
                DishGenError::ContentBlocked(text)
            } else {
                DishGenError::InvalidRequest(text)
            }
        }
    }
}

/// Parses one stream chunk, returning its image if it carries one.
fn parse_chunk(data: &str, index: usize) -> Result<Option<InlineData>> {
    let value: serde_json::Value = serde_json::from_str(data)?;
    if let Some(error) = value.get("error") {
        let status = error.get("code").and_then(|c| c.as_u64()).unwrap_or(500) as u16;
        return Err(parse_error(
            status,
            &value.to_string(),
            &reqwest::header::HeaderMap::new(),
        ));
    }
    let response: GeminiResponse = serde_json::from_value(value)?;
    let image = extract_image(response)?;
    if image.is_none() {
        tracing::debug!(chunk = index, "stream chunk without image data");
    }
    Ok(image)
}

/// Finds the first inline image in a response, logging text parts.
///
/// Blocks and safety finish reasons are errors; a response that is simply
/// missing an image yields `None`.
fn extract_image(response: GeminiResponse) -> Result<Option<InlineData>> {
    if let Some(ref feedback) = response.prompt_feedback {
        if let Some(ref reason) = feedback.block_reason {
            let msg = feedback
                .block_reason_message
                .clone()
                .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
            return Err(DishGenError::ContentBlocked(msg));
        }
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(None);
    };

    if let Some(ref finish_reason) = candidate.finish_reason {
        match finish_reason.as_str() {
            "SAFETY"
            | "IMAGE_SAFETY"
            | "IMAGE_PROHIBITED_CONTENT"
            | "IMAGE_RECITATION"
            | "RECITATION"
            | "PROHIBITED_CONTENT"
            | "BLOCKLIST" => {
                return Err(DishGenError::ContentBlocked(format!(
                    "Content blocked by Gemini safety filter: {}",
                    finish_reason
                )));
            }
            "IMAGE_OTHER" | "NO_IMAGE" => {
                return Err(DishGenError::EmptyResponse(format!(
                    "Generation finished without an image: {}",
                    finish_reason
                )));
            }
            _ => {}
        }
    }

    let Some(content) = candidate.content else {
        return Ok(None);
    };

    for part in content.parts {
        if let Some(inline) = part.inline_data {
            return Ok(Some(inline));
        }
        if let Some(text) = part.text.filter(|t| !t.trim().is_empty()) {
            tracing::info!("model commentary: {}", text.trim());
        }
    }
    Ok(None)
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiTextPart>,
}

#[derive(Debug, Serialize)]
struct GeminiTextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
}

impl GeminiRequest {
    fn new(prompt: &str, model: GeminiModel) -> Self {
        Self {
            contents: vec![GeminiContent {
                parts: vec![GeminiTextPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiConfig {
                response_modalities: model.response_modalities(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}
