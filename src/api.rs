//! Text-generation API interaction with exponential backoff retry logic.
//!
//! - [`AskAsync`]: core trait for sending text and getting a completion back
//! - [`ChatCompletionsClient`]: OpenAI-compatible `/chat/completions` client
//!   carrying a fixed system prompt
//! - [`RetryAsk`]: decorator that retries transient failures
//!
//! # Retry Strategy
//!
//! - Only retriable errors (network, timeout, 429, 5xx) are retried
//! - Exponential backoff from `base_delay`, capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd
//! - Waits go through the injected [`Clock`]

use crate::clock::Clock;
use crate::config::SummarizerConfig;
use crate::error::SummarizationError;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use rand::{rng, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, error, instrument, warn};

/// Trait for async text-generation interaction.
#[async_trait]
pub trait AskAsync: Send + Sync {
    async fn ask(&self, text: &str) -> Result<String, SummarizationError>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..max_jitter)
/// ```
pub struct RetryAsk<T> {
    inner: T,
    clock: Arc<dyn Clock>,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
    max_jitter: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Backoff waits go through `clock`.
    pub fn new(
        inner: T,
        clock: Arc<dyn Clock>,
        max_retries: usize,
        base_delay: StdDuration,
    ) -> Self {
        Self {
            inner,
            clock,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
            max_jitter: StdDuration::from_millis(250),
        }
    }

    pub fn with_max_jitter(mut self, max_jitter: StdDuration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(31);
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter_ms: u64 = if jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=jitter_ms)
        };
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<String, SummarizationError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            let e = match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };
            attempt += 1;
            let attempt_dt = attempt_t0.elapsed();
            let total_dt = total_t0.elapsed();

            if !e.is_retriable() || attempt > self.max_retries {
                error!(
                    attempt,
                    max = self.max_retries,
                    elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                    elapsed_ms_total = total_dt.as_millis() as u64,
                    error = %e,
                    "ask() giving up"
                );
                return Err(e);
            }

            let delay = self.backoff(attempt);
            warn!(
                attempt,
                max = self.max_retries,
                elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                elapsed_ms_total = total_dt.as_millis() as u64,
                ?delay,
                error = %e,
                "ask() attempt failed; backing off"
            );
            drop(e);
            self.clock.sleep(delay).await;
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completion client with a fixed system prompt.
///
/// Each [`AskAsync::ask`] sends exactly two messages: the system prompt and
/// the given text as the user message. The reply is trimmed.
pub struct ChatCompletionsClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: String,
    timeout: StdDuration,
}

impl fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ChatCompletionsClient {
    pub fn new(http: Client, config: &SummarizerConfig, api_key: &str, system_prompt: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            system_prompt: system_prompt.to_string(),
            timeout: config.timeout(),
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> SummarizationError {
        if e.is_timeout() {
            SummarizationError::Timeout(self.timeout)
        } else {
            SummarizationError::Http(e)
        }
    }
}

#[async_trait]
impl AskAsync for ChatCompletionsClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> Result<String, SummarizationError> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                %status,
                body = %truncate_for_log(&body, 300),
                "API call failed"
            );
            return Err(SummarizationError::UnexpectedStatus {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.map_send_error(e))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(SummarizationError::EmptyCompletion)?;

        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            reply = %truncate_for_log(&content, 200),
            "API call succeeded"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Fails with the queued errors, then succeeds.
    struct Flaky {
        errors: Mutex<Vec<SummarizationError>>,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(errors: Vec<SummarizationError>) -> Self {
            Self {
                errors: Mutex::new(errors),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AskAsync for Flaky {
        async fn ask(&self, _text: &str) -> Result<String, SummarizationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.errors.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok("ok".to_string()),
            }
        }
    }

    fn server_error() -> SummarizationError {
        SummarizationError::UnexpectedStatus {
            status: 503,
            body: "busy".to_string(),
        }
    }

    fn test_config(server: &MockServer) -> SummarizerConfig {
        SummarizerConfig {
            api_base: format!("{}/v1/", server.uri()),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 5,
            max_retries: 0,
            retry_base_delay_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let clock = Arc::new(ManualClock::new());
        let api = RetryAsk::new(
            Flaky::new(vec![server_error(), server_error()]),
            clock.clone(),
            3,
            StdDuration::from_secs(1),
        )
        .with_max_jitter(StdDuration::ZERO);
        assert_eq!(api.ask("text").await.unwrap(), "ok");
        assert_eq!(api.inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            clock.sleeps(),
            vec![StdDuration::from_secs(1), StdDuration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let api = RetryAsk::new(
            Flaky::new(vec![server_error(), server_error(), server_error()]),
            Arc::new(ManualClock::new()),
            1,
            StdDuration::ZERO,
        )
        .with_max_jitter(StdDuration::ZERO);
        let err = api.ask("text").await.unwrap_err();
        assert!(matches!(err, SummarizationError::UnexpectedStatus { status: 503, .. }));
        assert_eq!(api.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_skips_non_retriable_errors() {
        let auth = SummarizationError::UnexpectedStatus {
            status: 401,
            body: "bad key".to_string(),
        };
        let clock = Arc::new(ManualClock::new());
        let api = RetryAsk::new(Flaky::new(vec![auth]), clock.clone(), 5, StdDuration::ZERO)
            .with_max_jitter(StdDuration::ZERO);
        assert!(api.ask("text").await.is_err());
        assert_eq!(api.inner.calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_backoff_is_capped() {
        let api = RetryAsk::new(
            Flaky::new(vec![]),
            Arc::new(ManualClock::new()),
            10,
            StdDuration::from_secs(1),
        )
            .with_max_jitter(StdDuration::ZERO);
        assert_eq!(api.backoff(1), StdDuration::from_secs(1));
        assert_eq!(api.backoff(3), StdDuration::from_secs(4));
        assert_eq!(api.backoff(10), StdDuration::from_secs(30));
    }

    #[tokio::test]
    async fn test_chat_client_sends_system_and_user_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Please summarize the following text: hi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  A summary.  \n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            ChatCompletionsClient::new(Client::new(), &test_config(&server), "sk-test", "Be brief.");
        let reply = client
            .ask("Please summarize the following text: hi")
            .await
            .unwrap();
        assert_eq!(reply, "A summary.");
    }

    #[tokio::test]
    async fn test_chat_client_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let client = ChatCompletionsClient::new(Client::new(), &test_config(&server), "k", "p");
        let err = client.ask("x").await.unwrap_err();
        match err {
            SummarizationError::UnexpectedStatus { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_client_empty_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = ChatCompletionsClient::new(Client::new(), &test_config(&server), "k", "p");
        let err = client.ask("x").await.unwrap_err();
        assert!(matches!(err, SummarizationError::EmptyCompletion));
    }

    #[tokio::test]
    async fn test_chat_client_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(StdDuration::from_secs(3))
                    .set_body_json(json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.timeout_secs = 1;
        let client = ChatCompletionsClient::new(Client::new(), &config, "k", "p");
        let err = client.ask("x").await.unwrap_err();
        assert!(matches!(err, SummarizationError::Timeout(d) if d == StdDuration::from_secs(1)));
    }
}
