//! Reflection and insight distillation.
//!
//! A reflection pass is a two-call state machine:
//!
//! ```text
//! trajectory + feedback ─→ critique ─→ structured insights ─→ delta entries
//! ```
//!
//! The critique call is free text and degrades to a placeholder on failure,
//! like generation. The distillation call is schema-constrained: the model is
//! asked for JSON conforming to the [`InsightList`] schema (generated with
//! `schemars`), and the response is validated with `jsonschema` before use.
//! Absent, malformed, or schema-invalid output is a [`DistillationError`];
//! the orchestrator falls back to a single sentinel insight so curation
//! always receives a valid list. No stage retries automatically beyond the
//! transport-level retry policy.

use super::ModelOutcome;
use super::capability::CompletionModel;
use super::config::render_template;
use crate::store::LessonEntry;
use crate::{Message, json_schema_for};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Placeholder critique substituted when the reflection call fails.
pub const REFLECTION_PLACEHOLDER: &str =
    "An error occurred while reflecting on the reasoning trajectory.";

/// Sentinel insight recorded when distillation fails. Keeps the pipeline
/// total: curation always receives at least one entry for a failed cycle,
/// never an accidental empty list.
pub const DISTILLATION_FALLBACK_INSIGHT: &str =
    "An error occurred while distilling insights from the reflection.";

// ── Structured output shape ────────────────────────────────────────

/// One distilled insight: a short, self-contained, reusable statement.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct Insight {
    /// A reusable lesson or observation.
    pub content: String,
}

/// The structured output the distillation call must return.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct InsightList {
    /// The extracted insights.
    pub insights: Vec<Insight>,
}

// ── Errors ─────────────────────────────────────────────────────────

/// Why a distillation attempt failed.
///
/// Distillation is the one stage with a hard validity requirement, so it is
/// the one stage with a typed error instead of a placeholder. Callers decide
/// the fallback; [`Orchestrator`](super::orchestrator::Orchestrator)
/// substitutes [`DISTILLATION_FALLBACK_INSIGHT`].
#[derive(Debug)]
pub enum DistillationError {
    /// The structured completion call itself failed.
    CallFailed(String),
    /// The model's output was not valid JSON.
    InvalidJson(String),
    /// The output was JSON but violated the insight schema.
    SchemaViolation(String),
}

impl std::fmt::Display for DistillationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistillationError::CallFailed(e) => write!(f, "distillation call failed: {e}"),
            DistillationError::InvalidJson(e) => write!(f, "distillation output is not JSON: {e}"),
            DistillationError::SchemaViolation(e) => {
                write!(f, "distillation output violates the insight schema: {e}")
            }
        }
    }
}

impl std::error::Error for DistillationError {}

// ── Reflector ──────────────────────────────────────────────────────

/// Critiques trajectories against feedback and distills critiques into
/// atomic insights.
pub struct Reflector<'a> {
    completion: &'a dyn CompletionModel,
    model: String,
    reflection_template: String,
    distillation_template: String,
}

impl<'a> Reflector<'a> {
    pub fn new(
        completion: &'a dyn CompletionModel,
        model: impl Into<String>,
        reflection_template: impl Into<String>,
        distillation_template: impl Into<String>,
    ) -> Self {
        Self {
            completion,
            model: model.into(),
            reflection_template: reflection_template.into(),
            distillation_template: distillation_template.into(),
        }
    }

    /// Critique a trajectory against feedback. One free-text completion;
    /// degrades to [`REFLECTION_PLACEHOLDER`] on failure.
    pub async fn reflect(&self, trajectory: &str, feedback: &str) -> ModelOutcome {
        debug!("Reflecting on trajectory with feedback: {feedback}");
        let prompt = render_template(
            &self.reflection_template,
            &[("trajectory", trajectory), ("feedback", feedback)],
        );

        match self
            .completion
            .complete(&self.model, vec![Message::user(prompt)])
            .await
        {
            Ok(text) => ModelOutcome::Completed(text),
            Err(e) => {
                warn!("Reflection failed: {e}");
                ModelOutcome::Degraded(REFLECTION_PLACEHOLDER.to_string())
            }
        }
    }

    /// Distill a critique into insight strings.
    ///
    /// The response must be JSON conforming to the [`InsightList`] schema.
    /// A valid empty list is `Ok(vec![])`: an explicit "nothing to learn",
    /// distinct from any failure. Insights with blank content are dropped
    /// after validation so they can never reach the store.
    pub async fn distill_insights(&self, critique: &str) -> Result<Vec<String>, DistillationError> {
        debug!("Distilling insights from critique");
        let schema = json_schema_for::<InsightList>();
        let schema_text = serde_json::to_string_pretty(&schema).unwrap_or_default();
        let prompt = render_template(
            &self.distillation_template,
            &[("critique", critique), ("schema", &schema_text)],
        );

        let raw = self
            .completion
            .complete_structured(
                &self.model,
                vec![Message::user(prompt)],
                "insight_list",
                schema.clone(),
            )
            .await
            .map_err(DistillationError::CallFailed)?;

        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| DistillationError::InvalidJson(e.to_string()))?;

        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| DistillationError::SchemaViolation(format!("schema compile: {e}")))?;
        let violations: Vec<String> = validator
            .iter_errors(&value)
            .map(|e| format!("{}: {e}", e.instance_path()))
            .collect();
        if !violations.is_empty() {
            return Err(DistillationError::SchemaViolation(violations.join("; ")));
        }

        let list: InsightList = serde_json::from_value(value)
            .map_err(|e| DistillationError::InvalidJson(e.to_string()))?;

        Ok(list
            .insights
            .into_iter()
            .map(|i| i.content)
            .filter(|c| !c.trim().is_empty())
            .collect())
    }

    /// Map insight strings to delta entries: un-embedded, empty metadata.
    /// Pure; no failure modes.
    pub fn format_delta_entries(&self, insights: &[String]) -> Vec<LessonEntry> {
        insights
            .iter()
            .map(|content| LessonEntry::new(content.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapt::capability::CompletionFuture;
    use crate::adapt::config::{DEFAULT_DISTILLATION_PROMPT, DEFAULT_REFLECTION_PROMPT};

    /// Completion fake that returns a fixed body for structured calls.
    struct StructuredScript {
        body: &'static str,
    }

    impl CompletionModel for StructuredScript {
        fn complete<'a>(&'a self, _model: &'a str, _messages: Vec<Message>) -> CompletionFuture<'a> {
            Box::pin(async { Ok("a critique".to_string()) })
        }

        fn complete_structured<'a>(
            &'a self,
            _model: &'a str,
            _messages: Vec<Message>,
            _schema_name: &'a str,
            _schema: serde_json::Value,
        ) -> CompletionFuture<'a> {
            let body = self.body.to_string();
            Box::pin(async move { Ok(body) })
        }
    }

    struct DeadCompletion;

    impl CompletionModel for DeadCompletion {
        fn complete<'a>(&'a self, _model: &'a str, _messages: Vec<Message>) -> CompletionFuture<'a> {
            Box::pin(async { Err("OpenRouter API HTTP 503: unavailable".to_string()) })
        }

        fn complete_structured<'a>(
            &'a self,
            _model: &'a str,
            _messages: Vec<Message>,
            _schema_name: &'a str,
            _schema: serde_json::Value,
        ) -> CompletionFuture<'a> {
            Box::pin(async { Err("OpenRouter API HTTP 503: unavailable".to_string()) })
        }
    }

    fn reflector(completion: &dyn CompletionModel) -> Reflector<'_> {
        Reflector::new(
            completion,
            "test/model",
            DEFAULT_REFLECTION_PROMPT,
            DEFAULT_DISTILLATION_PROMPT,
        )
    }

    #[tokio::test]
    async fn reflect_degrades_on_failure() {
        let r = reflector(&DeadCompletion);
        let outcome = r.reflect("trajectory", "feedback").await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.text(), REFLECTION_PLACEHOLDER);
    }

    #[tokio::test]
    async fn distill_parses_valid_output() {
        let script = StructuredScript {
            body: r#"{"insights":[{"content":"cache invalidation needs a policy"},{"content":"prefer memoization for pure functions"}]}"#,
        };
        let r = reflector(&script);
        let insights = r.distill_insights("critique").await.unwrap();
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0], "cache invalidation needs a policy");
    }

    #[tokio::test]
    async fn distill_accepts_explicit_empty_list() {
        let script = StructuredScript {
            body: r#"{"insights":[]}"#,
        };
        let r = reflector(&script);
        assert_eq!(r.distill_insights("critique").await.unwrap(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn distill_drops_blank_insights() {
        let script = StructuredScript {
            body: r#"{"insights":[{"content":"   "},{"content":"real lesson"}]}"#,
        };
        let r = reflector(&script);
        let insights = r.distill_insights("critique").await.unwrap();
        assert_eq!(insights, vec!["real lesson".to_string()]);
    }

    #[tokio::test]
    async fn distill_rejects_missing_insights_field() {
        let script = StructuredScript {
            body: r#"{"lessons":[]}"#,
        };
        let r = reflector(&script);
        match r.distill_insights("critique").await {
            Err(DistillationError::SchemaViolation(_)) => {}
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn distill_rejects_non_string_content() {
        let script = StructuredScript {
            body: r#"{"insights":[{"content":42}]}"#,
        };
        let r = reflector(&script);
        match r.distill_insights("critique").await {
            Err(DistillationError::SchemaViolation(_)) => {}
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn distill_rejects_malformed_json() {
        let script = StructuredScript {
            body: "not json at all",
        };
        let r = reflector(&script);
        match r.distill_insights("critique").await {
            Err(DistillationError::InvalidJson(_)) => {}
            other => panic!("expected InvalidJson, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn distill_surfaces_call_failure() {
        let r = reflector(&DeadCompletion);
        match r.distill_insights("critique").await {
            Err(DistillationError::CallFailed(_)) => {}
            other => panic!("expected CallFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delta_entries_are_unembedded_with_empty_metadata() {
        let script = StructuredScript {
            body: r#"{"insights":[]}"#,
        };
        let r = reflector(&script);
        let delta =
            r.format_delta_entries(&["lesson a".to_string(), "lesson b".to_string()]);
        assert_eq!(delta.len(), 2);
        for entry in &delta {
            assert!(entry.embedding.is_none());
            assert!(entry.metadata.is_empty());
        }
        assert_eq!(delta[0].content, "lesson a");
    }
}
