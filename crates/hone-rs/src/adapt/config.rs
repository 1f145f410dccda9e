//! Configuration for the adaptation loop.
//!
//! Prompt content is a parameter, not a contract: every prompt the loop sends
//! is rendered from a template held here, with `{placeholder}` substitution.
//! The defaults below are a reasonable starting point; swap any of them
//! without touching loop code.

use crate::DEFAULT_MODEL;

// ── Default prompt templates ───────────────────────────────────────

/// Generation template. Placeholders: `{query}`, `{lessons}`, `{documents}`.
pub const DEFAULT_GENERATION_PROMPT: &str = "\
You are an AI assistant. Use the two kinds of context below to resolve the query.

### Query
\"{query}\"

### Evolutionary context (lessons from past interactions)
{lessons}

### External context (information from documents)
{documents}

### Instructions
- Produce a step-by-step reasoning trajectory followed by a final answer to the query.";

/// Reflection template. Placeholders: `{trajectory}`, `{feedback}`.
pub const DEFAULT_REFLECTION_PROMPT: &str = "\
Analyze the reasoning trajectory and the feedback below and provide a critical reflection.

Trajectory:
{trajectory}

Feedback:
{feedback}

Identify what went well, what went wrong, and why.";

/// Distillation template. Placeholders: `{critique}`, `{schema}`.
///
/// The standalone-insight rule is part of the template because it is the only
/// place the model can be told: each insight is reused as future context with
/// no originating conversation attached.
pub const DEFAULT_DISTILLATION_PROMPT: &str = "\
Extract concrete, reusable lessons or insights from the reflection below.
Respond with a JSON object that strictly follows the provided JSON schema.
Each insight must stand alone as a future lesson: never refer to \"the
trajectory\", \"the feedback\", or this conversation.

Reflection:
{critique}

Follow this JSON schema exactly:
{schema}";

// ── Template rendering ─────────────────────────────────────────────

/// Substitute `{name}` placeholders in a template.
///
/// Unknown placeholders and all other text are left intact, so custom
/// templates can omit variables they don't care about.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

// ── Config ─────────────────────────────────────────────────────────

/// Configuration for the adaptation loop: which models run generation and
/// reflection, and the prompt templates they are sent.
///
/// ```ignore
/// let config = AdaptConfig::new("z-ai/glm-5")?
///     .with_reflector_model("z-ai/glm-5-air")
///     .with_generation_prompt(MY_TEMPLATE);
/// ```
#[derive(Debug, Clone)]
pub struct AdaptConfig {
    /// Model used for trajectory generation.
    pub generator_model: String,
    /// Model used for reflection and distillation. Defaults to the generator
    /// model; a cheaper model is often sufficient here.
    pub reflector_model: String,
    /// Template for the generation prompt.
    pub generation_prompt: String,
    /// Template for the reflection prompt.
    pub reflection_prompt: String,
    /// Template for the distillation prompt.
    pub distillation_prompt: String,
}

impl AdaptConfig {
    /// Create a config with the given generator model and default templates.
    ///
    /// An empty model name is a configuration error, rejected here at
    /// construction rather than surfacing per-cycle.
    pub fn new(model: impl Into<String>) -> Result<Self, String> {
        let model = model.into();
        if model.is_empty() {
            return Err("model name must not be empty".to_string());
        }
        Ok(Self {
            reflector_model: model.clone(),
            generator_model: model,
            ..Self::default()
        })
    }

    /// Use a different model for reflection and distillation.
    pub fn with_reflector_model(mut self, model: impl Into<String>) -> Self {
        self.reflector_model = model.into();
        self
    }

    /// Replace the generation prompt template.
    pub fn with_generation_prompt(mut self, template: impl Into<String>) -> Self {
        self.generation_prompt = template.into();
        self
    }

    /// Replace the reflection prompt template.
    pub fn with_reflection_prompt(mut self, template: impl Into<String>) -> Self {
        self.reflection_prompt = template.into();
        self
    }

    /// Replace the distillation prompt template.
    pub fn with_distillation_prompt(mut self, template: impl Into<String>) -> Self {
        self.distillation_prompt = template.into();
        self
    }
}

impl Default for AdaptConfig {
    fn default() -> Self {
        Self {
            generator_model: DEFAULT_MODEL.to_string(),
            reflector_model: DEFAULT_MODEL.to_string(),
            generation_prompt: DEFAULT_GENERATION_PROMPT.to_string(),
            reflection_prompt: DEFAULT_REFLECTION_PROMPT.to_string(),
            distillation_prompt: DEFAULT_DISTILLATION_PROMPT.to_string(),
        }
    }
}
