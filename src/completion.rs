//! Completion service: streamed LLM calls behind a fingerprint cache.
//!
//! One request is one opaque prompt string; the response is the full
//! concatenation of the stream's textual deltas, appended strictly in
//! arrival order. Callers never observe partial text: the stream is always
//! consumed to completion (or the wall-clock budget expires) before the
//! service returns.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::cache::{fingerprint, PromptCache, DEFAULT_TTL};
use crate::config::{CacheConfig, OpenAiConfig};
use crate::error::SynthesisError;

/// One chunk of a streamed completion.
///
/// Chunks without a textual delta (role markers, finish events) carry `None`
/// and are ignored by the accumulator.
#[derive(Debug, Clone)]
pub struct CompletionChunk {
    pub delta: Option<String>,
}

/// Stream of completion chunks in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, SynthesisError>> + Send>>;

/// A streaming completion backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Open a streaming completion for `prompt`.
    ///
    /// Transport or auth failures surface here; the returned stream yields
    /// chunks until the terminal event, then ends.
    async fn open_stream(&self, prompt: &str) -> Result<ChunkStream, SynthesisError>;

    /// Model name, for logging.
    fn model_name(&self) -> &str;

    /// Wall-clock budget for one full streamed completion.
    ///
    /// [`CompletionService`] adopts this as its budget at construction.
    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }
}

/// OpenAI-compatible chat-completions client.
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Deserialize, Default)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a new client; fails if the API key is empty.
    pub fn new(config: OpenAiConfig) -> Result<Self, SynthesisError> {
        if config.api_key.is_empty() {
            return Err(SynthesisError::Authentication);
        }
        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, SynthesisError> {
        Self::new(OpenAiConfig::from_env()?)
    }

    /// Parse one SSE `data:` payload into a chunk.
    fn parse_event(data: &str) -> Result<CompletionChunk, SynthesisError> {
        match serde_json::from_str::<ChatChunk>(data) {
            Ok(chunk) => {
                let delta = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content);
                Ok(CompletionChunk { delta })
            }
            Err(e) => Err(SynthesisError::Api {
                status: 200,
                body: format!("unparseable stream event ({e}): {data}"),
            }),
        }
    }

    /// Drive one SSE byte stream to completion, delivering parsed chunks.
    ///
    /// Lines are split on raw newline bytes and decoded only once complete,
    /// so a multibyte character falling across network chunk boundaries
    /// survives intact. A stream ending without a trailing newline still
    /// flushes its last buffered line.
    async fn pump_sse<S, B, E>(bytes: S, tx: mpsc::Sender<Result<CompletionChunk, SynthesisError>>)
    where
        S: Stream<Item = Result<B, E>> + Send,
        B: AsRef<[u8]> + Send,
        E: Into<SynthesisError> + Send,
    {
        futures::pin_mut!(bytes);
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(item) = bytes.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };
            buffer.extend_from_slice(chunk.as_ref());
            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                if Self::deliver_line(&tx, &line).await {
                    return;
                }
            }
        }
        if !buffer.is_empty() {
            let _ = Self::deliver_line(&tx, &buffer).await;
        }
    }

    /// Parse one SSE line and forward it; `true` means stop pumping.
    async fn deliver_line(
        tx: &mpsc::Sender<Result<CompletionChunk, SynthesisError>>,
        line: &[u8],
    ) -> bool {
        let line = String::from_utf8_lossy(line);
        let Some(data) = line.trim().strip_prefix("data:") else {
            return false;
        };
        let data = data.trim();
        if data == "[DONE]" {
            return true;
        }
        let event = Self::parse_event(data);
        let failed = event.is_err();
        tx.send(event).await.is_err() || failed
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn open_stream(&self, prompt: &str) -> Result<ChunkStream, SynthesisError> {
        let mut body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": true,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let url = format!("{}/chat/completions", self.config.base_url);
        debug!(model = %self.config.model, "opening completion stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel::<Result<CompletionChunk, SynthesisError>>(32);
        let bytes = response.bytes_stream();

        tokio::spawn(Self::pump_sse(bytes, tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

/// Cache-checked completion service.
///
/// Checks the prompt cache by fingerprint, and on a miss consumes one
/// streamed completion to the end before caching and returning it. Cache
/// store failures degrade to a forced miss and are logged, never surfaced.
pub struct CompletionService {
    backend: Arc<dyn CompletionBackend>,
    cache: Arc<dyn PromptCache>,
    ttl: Duration,
    budget: Duration,
}

impl CompletionService {
    pub fn new(backend: Arc<dyn CompletionBackend>, cache: Arc<dyn PromptCache>) -> Self {
        let budget = backend.timeout();
        Self {
            backend,
            cache,
            ttl: DEFAULT_TTL,
            budget,
        }
    }

    pub fn with_cache_config(mut self, config: &CacheConfig) -> Self {
        self.ttl = config.ttl;
        self
    }

    /// Override the budget adopted from the backend's configured timeout.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Produce the full completion text for `prompt`.
    pub async fn complete(&self, prompt: &str) -> Result<String, SynthesisError> {
        let key = fingerprint(prompt);

        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                debug!(fingerprint = %key, "returning cached completion");
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!(fingerprint = %key, error = %e, "cache read failed, forcing miss"),
        }

        debug!(
            fingerprint = %key,
            model = self.backend.model_name(),
            "requesting completion"
        );

        let consume = async {
            let mut stream = self.backend.open_stream(prompt).await?;
            let mut text = String::new();
            while let Some(chunk) = stream.next().await {
                if let Some(delta) = chunk?.delta {
                    text.push_str(&delta);
                }
            }
            Ok::<String, SynthesisError>(text)
        };

        let text = tokio::time::timeout(self.budget, consume)
            .await
            .map_err(|_| SynthesisError::Timeout(self.budget))??;

        if let Err(e) = self.cache.set(&key, &text, self.ttl).await {
            warn!(fingerprint = %key, error = %e, "cache write failed");
        }
        Ok(text)
    }
}
