//! Collaborator capabilities: the seams between the adaptation loop and the
//! outside world.
//!
//! The loop needs three things it cannot do itself: chat completions
//! ([`CompletionModel`]), text embeddings ([`Embedder`]), and optionally
//! document retrieval ([`ExternalRetriever`]). Each is a dyn-compatible trait
//! returning a boxed future, so orchestrators can hold `&dyn` references and
//! tests can substitute scripted fakes.
//!
//! Bundled implementations: [`OpenRouterClient`](crate::OpenRouterClient) for
//! completions and [`EmbeddingsClient`](crate::api::embeddings::EmbeddingsClient)
//! for embeddings. There is no bundled retriever; document ingestion lives
//! outside this crate.

use crate::{ChatRequest, Message, OpenRouterClient, ResponseFormat};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`CompletionModel`] methods.
pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// Boxed future returned by [`Embedder::encode`].
pub type EmbedFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>, String>> + Send + 'a>>;

/// Boxed future returned by [`ExternalRetriever::retrieve`].
pub type RetrievalFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<RetrievedDoc>, String>> + Send + 'a>>;

/// A document fragment returned by an external retriever.
#[derive(Clone, Debug)]
pub struct RetrievedDoc {
    pub content: String,
}

/// Chat completion capability.
///
/// Errors are plain strings; the generator and reflector convert them into
/// degraded placeholder outcomes rather than propagating them.
pub trait CompletionModel: Send + Sync {
    /// One free-text completion for the given messages.
    fn complete<'a>(&'a self, model: &'a str, messages: Vec<Message>) -> CompletionFuture<'a>;

    /// One completion constrained to JSON conforming to `schema`.
    ///
    /// Implementations should request schema-constrained output where the
    /// backing API supports it; the caller still validates the returned text
    /// against the schema before use.
    fn complete_structured<'a>(
        &'a self,
        model: &'a str,
        messages: Vec<Message>,
        schema_name: &'a str,
        schema: serde_json::Value,
    ) -> CompletionFuture<'a>;
}

/// Text embedding capability.
///
/// Must be deterministic for a given (model, text) pair: the store's
/// idempotent re-materialization depends on it.
pub trait Embedder: Send + Sync {
    fn encode<'a>(&'a self, text: &'a str) -> EmbedFuture<'a>;
}

/// Optional external document retrieval capability.
///
/// Absence of a retriever is a valid configuration (the cycle runs with an
/// empty external context), and a retriever error degrades to the same.
pub trait ExternalRetriever: Send + Sync {
    fn retrieve<'a>(&'a self, query: &'a str) -> RetrievalFuture<'a>;
}

// ── Bundled completion implementation ──────────────────────────────

impl CompletionModel for OpenRouterClient {
    fn complete<'a>(&'a self, model: &'a str, messages: Vec<Message>) -> CompletionFuture<'a> {
        Box::pin(async move {
            let body = ChatRequest {
                model: Some(model.to_string()),
                messages,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                ..Default::default()
            };
            let completion = self.chat_with_retry(&body).await?;
            completion
                .content
                .filter(|c| !c.is_empty())
                .ok_or_else(|| "empty completion response".to_string())
        })
    }

    fn complete_structured<'a>(
        &'a self,
        model: &'a str,
        messages: Vec<Message>,
        schema_name: &'a str,
        schema: serde_json::Value,
    ) -> CompletionFuture<'a> {
        Box::pin(async move {
            let body = ChatRequest {
                model: Some(model.to_string()),
                messages,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                response_format: Some(ResponseFormat::json_schema(schema_name, schema)),
                ..Default::default()
            };
            let completion = self.chat_with_retry(&body).await?;
            completion
                .content
                .filter(|c| !c.is_empty())
                .ok_or_else(|| "empty structured completion response".to_string())
        })
    }
}
