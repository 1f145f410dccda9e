//! Embeddings client for the OpenAI-compatible embeddings endpoint.
//!
//! Lesson retrieval and materialization both go through the
//! [`Embedder`](crate::adapt::capability::Embedder) capability; this is the
//! bundled implementation. OpenRouter proxies the OpenAI embeddings API, so
//! the same API key used for chat completions works here.
//!
//! Embeddings must be deterministic for a given (model, text) pair: the store
//! relies on that to keep re-materialization idempotent. Embedding endpoints
//! satisfy this; if you implement a custom [`Embedder`], preserve it.

use crate::adapt::capability::{EmbedFuture, Embedder};
use crate::api::retry::{RetryConfig, retry_api_call};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub const OPENROUTER_EMBEDDINGS_URL: &str = "https://openrouter.ai/api/v1/embeddings";

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize, Debug)]
struct RawEmbeddingsResponse {
    data: Option<Vec<RawEmbeddingItem>>,
    error: Option<RawEmbeddingsError>,
}

#[derive(Deserialize, Debug)]
struct RawEmbeddingItem {
    embedding: Vec<f32>,
}

#[derive(Deserialize, Debug)]
struct RawEmbeddingsError {
    message: String,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the embeddings endpoint.
pub struct EmbeddingsClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl EmbeddingsClient {
    /// Create a new client for the given API key and embedding model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, String> {
        let model = model.into();
        if model.is_empty() {
            return Err("embedding model name must not be empty".to_string());
        }
        let client = reqwest::Client::builder()
            .user_agent("hone-rs/0.3")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model,
            retry: RetryConfig::default(),
        })
    }

    /// Set the retry policy for transient API errors.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The embedding model this client encodes with.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request an embedding for a single text (single attempt, no retry).
    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, String> {
        let body = EmbeddingsRequest {
            model: &self.model,
            input: vec![text],
        };
        debug!("Embedding request: model={}, {} chars", self.model, text.len());

        let start = Instant::now();
        let resp = self
            .client
            .post(OPENROUTER_EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text_body = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;
        trace!(
            "Embedding response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text_body.len()
        );

        if !status.is_success() {
            return Err(format!("embeddings API HTTP {status}: {text_body}"));
        }

        let parsed: RawEmbeddingsResponse = serde_json::from_str(&text_body)
            .map_err(|e| format!("failed to parse embeddings response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("embeddings API error: {}", err.message));
        }

        parsed
            .data
            .and_then(|d| d.into_iter().next())
            .map(|item| item.embedding)
            .ok_or_else(|| "embeddings response contained no vectors".to_string())
    }
}

impl Embedder for EmbeddingsClient {
    fn encode<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        Box::pin(async move { retry_api_call(&self.retry, || self.embed_once(text)).await })
    }
}
