//! Trajectory generation.
//!
//! The generator makes exactly one completion call per cycle: it renders the
//! generation template with the query and both context blobs, sends it, and
//! returns the trajectory together with the exact prompt that was sent. The
//! prompt is retained for auditability and never reused programmatically.
//!
//! Failure policy: degrade, don't abort. This is a best-effort advisory
//! subsystem, so a failed completion yields
//! [`ModelOutcome::Degraded`](super::ModelOutcome::Degraded) with a fixed
//! placeholder and the cycle continues.

use super::ModelOutcome;
use super::capability::CompletionModel;
use super::config::render_template;
use crate::Message;
use tracing::{debug, warn};

/// Placeholder trajectory substituted when the completion call fails.
pub const GENERATION_PLACEHOLDER: &str =
    "An error occurred while generating the reasoning trajectory.";

/// Produces a reasoning trajectory for a query, conditioned on the
/// evolutionary and external contexts.
pub struct Generator<'a> {
    completion: &'a dyn CompletionModel,
    model: String,
    template: String,
}

impl<'a> Generator<'a> {
    pub fn new(
        completion: &'a dyn CompletionModel,
        model: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            completion,
            model: model.into(),
            template: template.into(),
        }
    }

    /// Generate a trajectory for `query`.
    ///
    /// Returns the trajectory outcome and the exact prompt text sent to the
    /// model.
    pub async fn generate_trajectory(
        &self,
        lessons_text: &str,
        documents_text: &str,
        query: &str,
    ) -> (ModelOutcome, String) {
        debug!("Generating trajectory for query: {query}");
        let prompt = render_template(
            &self.template,
            &[
                ("query", query),
                ("lessons", lessons_text),
                ("documents", documents_text),
            ],
        );

        let messages = vec![Message::user(prompt.clone())];
        let outcome = match self.completion.complete(&self.model, messages).await {
            Ok(text) => ModelOutcome::Completed(text),
            Err(e) => {
                warn!("Trajectory generation failed: {e}");
                ModelOutcome::Degraded(GENERATION_PLACEHOLDER.to_string())
            }
        };

        (outcome, prompt)
    }
}
