//! Adaptive context engineering for LLM applications.
//!
//! `hone-rs` maintains an *evolving lesson pool*: a bounded collection of
//! short natural-language lessons that is injected into a generative model's
//! prompt and continuously improved from feedback on the model's own answers.
//! The core abstraction is the [`Orchestrator`](adapt::orchestrator::Orchestrator),
//! a sequential adaptation loop that, for each query/feedback pair:
//!
//! 1. retrieves the most relevant stored lessons by cosine similarity,
//! 2. generates a reasoning trajectory conditioned on those lessons (plus any
//!    externally retrieved documents),
//! 3. asks the model to critique its own trajectory against the feedback,
//! 4. distills the critique into schema-validated atomic insights, and
//! 5. curates the insights into the pool (merge, deduplicate, prune) before
//!    atomically replacing the stored context and re-embedding new entries.
//!
//! # Getting started
//!
//! ```ignore
//! use hone_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let client = OpenRouterClient::new(api_key.clone())?;
//!     let embedder = EmbeddingsClient::new(api_key, "openai/text-embedding-3-small")?;
//!
//!     let config = AdaptConfig::new("z-ai/glm-5")?;
//!     let mut orchestrator = Orchestrator::new(&client, &embedder, config);
//!
//!     let report = orchestrator
//!         .run_cycle("how should I cache results?", "the answer ignored invalidation", CycleMode::Online, 5)
//!         .await;
//!
//!     println!("{}", report.trajectory.text());
//!     for lesson in &report.context {
//!         println!("- {}", lesson.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! If you're looking for how to...
//!
//! - **Store and retrieve lessons:** see [`ContextStore`](store::ContextStore)
//!   and [`LessonEntry`](store::LessonEntry). Retrieval is a stable-ordered
//!   cosine-similarity scan; embeddings are materialized lazily and
//!   idempotently.
//!
//! - **Run the adaptation loop:** see
//!   [`Orchestrator`](adapt::orchestrator::Orchestrator) for single cycles,
//!   offline (dataset/epoch) runs, and online (streaming) runs, and
//!   [`AdaptConfig`](adapt::config::AdaptConfig) for models, prompts, and
//!   pruning policy.
//!
//! - **Plug in model capabilities:** implement
//!   [`CompletionModel`](adapt::capability::CompletionModel),
//!   [`Embedder`](adapt::capability::Embedder), or
//!   [`ExternalRetriever`](adapt::capability::ExternalRetriever). The bundled
//!   implementations are [`OpenRouterClient`] (chat completions) and
//!   [`EmbeddingsClient`](api::embeddings::EmbeddingsClient).
//!
//! - **Observe a run:** implement
//!   [`CycleObserver`](adapt::events::CycleObserver) to receive
//!   [`CycleEvent`](adapt::events::CycleEvent)s for logging or metrics, or use
//!   the bundled [`LoggingObserver`](adapt::events::LoggingObserver).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`store`] | Lesson entries, the evolutionary context, similarity retrieval |
//! | [`adapt`] | Generator, reflector, curator, orchestrator, config, events |
//! | [`api`] | Retry with backoff, embeddings client |
//!
//! # Design principles
//!
//! 1. **Degrade, don't abort.** A failed model call never kills a cycle: the
//!    generator and reflector substitute tagged placeholder outcomes and the
//!    loop continues. Distillation failures fall back to a sentinel insight.
//!
//! 2. **The store is replaced, never patched.** Curation produces a whole new
//!    context sequence which replaces the stored one atomically at the end of
//!    a cycle. A cycle that dies mid-way leaves no partial state.
//!
//! 3. **One cycle at a time.** `run_cycle` takes `&mut self`; the exclusive
//!    borrow makes the retrieve-then-replace sequence safe without locks.
//!
//! 4. **Prompts are parameters.** Every prompt is a template in
//!    [`AdaptConfig`](adapt::config::AdaptConfig), not a hard-coded contract.

pub mod adapt;
pub mod api;
pub mod prelude;
pub mod store;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::api::retry::RetryConfig;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for generation and reflection calls.
pub const DEFAULT_MODEL: &str = "z-ai/glm-5";

/// Default embedding model (OpenRouter proxies the OpenAI embeddings API).
pub const DEFAULT_EMBEDDING_MODEL: &str = "openai/text-embedding-3-small";

/// Default maximum tokens per completion response.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust types
/// and the schema-constrained output mode of the chat completions API.
///
/// # Example
///
/// ```
/// use hone_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct Verdict {
///     accepted: bool,
/// }
///
/// let schema = json_schema_for::<Verdict>();
/// assert_eq!(schema["type"], "object");
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Subset of the OpenRouter API fields that the
/// adaptation loop needs — unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    // Output format (structured distillation uses `json_schema`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// JSON output format type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "json_object")]
    JsonObject,
    #[serde(rename = "json_schema")]
    JsonSchema,
}

/// JSON output mode. Use [`ResponseFormat::json_schema`] to constrain the
/// model to a specific schema.
#[derive(Serialize, Clone, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaSpec>,
}

/// Named schema payload for `json_schema` response format.
#[derive(Serialize, Clone, Debug)]
pub struct JsonSchemaSpec {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

impl ResponseFormat {
    /// Free-form JSON object output.
    pub fn json_object() -> Self {
        Self {
            fmt_type: ResponseFormatType::JsonObject,
            json_schema: None,
        }
    }

    /// Schema-constrained JSON output.
    pub fn json_schema(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            fmt_type: ResponseFormatType::JsonSchema,
            json_schema: Some(JsonSchemaSpec {
                name: name.into(),
                strict: true,
                schema,
            }),
        }
    }
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`OpenRouterClient::chat()`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
///
/// Implements [`CompletionModel`](adapt::capability::CompletionModel):
/// the generator and reflector issue their calls through this client, with
/// transient errors (429, 5xx, network timeouts) retried per the configured
/// [`RetryConfig`] before the caller's degrade policy kicks in.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
    pub(crate) retry: RetryConfig,
    pub(crate) max_tokens: u32,
    pub(crate) temperature: f32,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/hone-rs", "hone-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("hone-rs/0.3")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
            retry: RetryConfig::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    /// Set the retry policy for transient API errors.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the maximum tokens per completion response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Send a chat completion request (single attempt, no retry).
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        let msg_count = body.messages.len();
        let model_label = body.model.as_deref().unwrap_or("(none)");
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            model_label, msg_count, body.max_tokens, body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        let elapsed = start.elapsed();
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            elapsed.as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("OpenRouter API error: {}", err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());

        match choice {
            Some(c) => {
                debug!(
                    "LLM output: {} chars text",
                    c.message.content.as_ref().map_or(0, |s| s.len())
                );
                Ok(ChatCompletion {
                    content: c.message.content,
                    usage: parsed.usage,
                    finish_reason: c.finish_reason,
                })
            }
            None => {
                debug!("LLM output: empty (no choices)");
                Ok(ChatCompletion {
                    content: None,
                    usage: parsed.usage,
                    finish_reason: None,
                })
            }
        }
    }

    /// Send a chat completion request, retrying transient errors per the
    /// configured [`RetryConfig`].
    pub async fn chat_with_retry(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        crate::api::retry::retry_api_call(&self.retry, || self.chat(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content, "hello");

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);

        let assist = Message::assistant("trajectory");
        assert_eq!(assist.role, MessageRole::Assistant);
    }

    #[test]
    fn chat_request_default_skips_none_fields() {
        let req = ChatRequest {
            model: Some("test-model".into()),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            temperature: 0.5,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("seed").is_none());
        assert!(json.get("stop").is_none());
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn response_format_json_schema_serializes_schema() {
        let fmt = ResponseFormat::json_schema(
            "insight_list",
            serde_json::json!({"type": "object"}),
        );
        let json = serde_json::to_value(&fmt).unwrap();
        assert_eq!(json["type"], "json_schema");
        assert_eq!(json["json_schema"]["name"], "insight_list");
        assert_eq!(json["json_schema"]["strict"], true);
    }

    #[test]
    fn zero_generation_params_omitted() {
        let req = ChatRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());
    }
}
