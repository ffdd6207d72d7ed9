//! Retrying generation client.

use crate::generation::retry::RetryPolicy;
use crate::generation::transport::Transport;
use crate::generation::types::GenerationResult;

/// Sends prompts through a transport, retrying every failure up to the
/// policy's attempt bound.
pub struct GenerationClient {
    transport: Box<dyn Transport>,
    policy: RetryPolicy,
}

impl GenerationClient {
    /// Creates a client over the given transport.
    pub fn new(transport: impl Transport + 'static, policy: RetryPolicy) -> Self {
        Self {
            transport: Box::new(transport),
            policy,
        }
    }

    /// Returns the retry policy in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Generates one image, retrying until success or the attempt bound.
    pub async fn generate(&self, prompt: &str) -> GenerationResult {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            tracing::debug!(attempt, max_attempts, transport = self.transport.name(), "sending prompt");

            let err = match self.transport.send(prompt).await {
                Ok(image) => {
                    tracing::info!(
                        attempt,
                        bytes = image.size(),
                        mime_type = %image.mime_type,
                        duration_ms = image.duration_ms,
                        "image received"
                    );
                    return GenerationResult::succeeded(image, attempt);
                }
                Err(e) => e,
            };

            if attempt >= max_attempts {
                tracing::error!(
                    attempt,
                    kind = %err.kind(),
                    "giving up after {max_attempts} attempts: {err}"
                );
                return GenerationResult::failed(&err, attempt);
            }

            let delay = self.policy.delay_after(attempt, &err);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                suggested = err.suggested_delay().is_some(),
                "retrying after error: {err}"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DishGenError, ErrorKind, Result};
    use crate::generation::types::{GeneratedImage, TransportKind};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Replays a fixed script of outcomes and records when each call started.
    struct Scripted {
        script: Mutex<VecDeque<Result<GeneratedImage>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<GeneratedImage>>) -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for std::sync::Arc<Scripted> {
        async fn send(&self, _prompt: &str) -> Result<GeneratedImage> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DishGenError::EmptyResponse("script exhausted".into())))
        }

        fn kind(&self) -> TransportKind {
            TransportKind::Gemini
        }
    }

    fn server_error() -> DishGenError {
        DishGenError::Api {
            status: 503,
            message: "overloaded".into(),
        }
    }

    fn png() -> GeneratedImage {
        GeneratedImage::new(vec![0x89, 0x50, 0x4E, 0x47], "image/png")
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_uses_every_attempt() {
        let transport = Scripted::new((0..10).map(|_| Err(server_error())).collect());
        let policy = RetryPolicy::new(4, Duration::from_secs(1), Duration::from_secs(10)).unwrap();
        let client = GenerationClient::new(transport.clone(), policy);

        let result = client.generate("A bowl of pasta").await;

        assert!(!result.success);
        assert_eq!(result.attempts, 4);
        assert_eq!(result.error_kind, Some(ErrorKind::ServerError));
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_server_error_then_success() {
        let transport = Scripted::new(vec![Err(server_error()), Ok(png())]);
        let client = GenerationClient::new(transport.clone(), RetryPolicy::default());

        let result = client.generate("A bowl of pasta").await;

        assert!(result.success);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.mime_type.as_deref(), Some("image/png"));

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1] - calls[0] >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_between_attempts() {
        let transport = Scripted::new(vec![
            Err(DishGenError::EmptyResponse("text only".into())),
            Err(DishGenError::EmptyResponse("text only".into())),
            Err(DishGenError::EmptyResponse("text only".into())),
            Ok(png()),
        ]);
        let client = GenerationClient::new(transport.clone(), RetryPolicy::default());

        let result = client.generate("A bowl of pasta").await;
        assert!(result.success);

        let calls = transport.calls();
        let gaps: Vec<_> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] >= Duration::from_secs(1));
        assert!(gaps[1] >= Duration::from_secs(2));
        assert!(gaps[2] >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_overrides_backoff() {
        let transport = Scripted::new(vec![
            Err(DishGenError::RateLimited {
                retry_after: Some(Duration::from_secs(30)),
            }),
            Ok(png()),
        ]);
        let client = GenerationClient::new(transport.clone(), RetryPolicy::default());

        let result = client.generate("A bowl of pasta").await;
        assert!(result.success);

        let calls = transport.calls();
        assert!(calls[1] - calls[0] >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_to_exhaustion_reports_kind() {
        let transport = Scripted::new(
            (0..5)
                .map(|_| Err(DishGenError::RateLimited { retry_after: None }))
                .collect(),
        );
        let client = GenerationClient::new(transport.clone(), RetryPolicy::default());

        let result = client.generate("A bowl of pasta").await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::RateLimited));
        assert_eq!(result.attempts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_uses_every_attempt() {
        let transport = Scripted::new(
            (0..10)
                .map(|_| Err(DishGenError::Auth("API key not valid".into())))
                .collect(),
        );
        let client = GenerationClient::new(transport.clone(), RetryPolicy::default());

        let result = client.generate("A bowl of pasta").await;
        assert!(!result.success);
        assert_eq!(result.attempts, 5);
        assert_eq!(result.error_kind, Some(ErrorKind::Unknown));
        assert!(result.error_message.unwrap().contains("API key not valid"));
        assert_eq!(transport.calls().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_are_retried_until_success() {
        let transport = Scripted::new(vec![
            Err(DishGenError::InvalidRequest("bad field".into())),
            Err(DishGenError::ContentBlocked("IMAGE_SAFETY".into())),
            Ok(png()),
        ]);
        let client = GenerationClient::new(transport.clone(), RetryPolicy::default());

        let result = client.generate("A bowl of pasta").await;
        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(transport.calls().len(), 3);
    }
}
