//! The adaptation loop driver.
//!
//! [`Orchestrator::run_cycle`] sequences one full cycle; the offline and
//! online drivers repeat it over a dataset or a task stream. Stages run
//! strictly in order because each one's output feeds the next: generation
//! must see the context as retrieved, and reflection must see the trajectory
//! actually produced for the query.
//!
//! # Concurrency
//!
//! The evolutionary context is a single mutable resource and a cycle is a
//! read-then-replace sequence over it, which is not safe under interleaving:
//! two cycles merging against the same stale snapshot would silently lose
//! one set of insights. `run_cycle` therefore takes `&mut self` — the
//! exclusive borrow serializes cycles at compile time. Run concurrent cycles
//! by queueing calls, not by sharing the orchestrator.
//!
//! # Failure
//!
//! A cycle never returns an error. Model calls degrade to placeholders,
//! distillation falls back to a sentinel insight, and a failed external
//! retrieval becomes an empty external context. The store is only replaced
//! atomically at the end of a cycle, so a degraded cycle leaves no partial
//! state.

use super::capability::{CompletionModel, Embedder, ExternalRetriever};
use super::config::AdaptConfig;
use super::curator::{Curator, PrunePolicy};
use super::events::{CycleEvent, CycleMode, CycleObserver, NoopObserver};
use super::generator::Generator;
use super::reflector::{DISTILLATION_FALLBACK_INSIGHT, Reflector};
use super::ModelOutcome;
use crate::store::{ContextStore, LessonEntry};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ── Inputs and outputs ─────────────────────────────────────────────

/// One record of an adaptation dataset or task stream.
///
/// Malformed training data is expected: a record missing its query or its
/// feedback is skipped, it does not halt a run. An empty `query` counts as
/// missing; an empty `feedback` string counts as present.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TaskRecord {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl TaskRecord {
    pub fn new(query: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            feedback: Some(feedback.into()),
        }
    }

    /// The (query, feedback) pair if this record is eligible for a cycle.
    pub fn eligible(&self) -> Option<(&str, &str)> {
        let query = self.query.as_deref().filter(|q| !q.is_empty())?;
        let feedback = self.feedback.as_deref()?;
        Some((query, feedback))
    }
}

/// What one adaptation cycle produced.
#[derive(Debug)]
pub struct CycleReport {
    /// The generated trajectory (tagged if degraded to a placeholder).
    pub trajectory: ModelOutcome,
    /// The exact generation prompt that was sent, retained for audit.
    pub prompt: String,
    /// Snapshot of the evolutionary context after curation.
    pub context: Vec<LessonEntry>,
}

// ── Orchestrator ───────────────────────────────────────────────────

/// Sequences adaptation cycles over the lesson pool.
///
/// ```ignore
/// let config = AdaptConfig::new("z-ai/glm-5")?;
/// let mut orchestrator = Orchestrator::new(&client, &embedder, config)
///     .with_observer(&LoggingObserver)
///     .with_prune_policy(Box::new(RecencyBound::new(100)));
///
/// let report = orchestrator
///     .run_cycle("how to cache results", "the answer was too slow", CycleMode::Online, 5)
///     .await;
/// ```
pub struct Orchestrator<'a> {
    embedder: &'a dyn Embedder,
    retriever: Option<&'a dyn ExternalRetriever>,
    observer: &'a dyn CycleObserver,
    generator: Generator<'a>,
    reflector: Reflector<'a>,
    curator: Curator,
    store: ContextStore,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator over the given capabilities, with an empty
    /// context, no external retriever, and no pruning.
    pub fn new(
        completion: &'a dyn CompletionModel,
        embedder: &'a dyn Embedder,
        config: AdaptConfig,
    ) -> Self {
        let generator = Generator::new(
            completion,
            config.generator_model,
            config.generation_prompt,
        );
        let reflector = Reflector::new(
            completion,
            config.reflector_model,
            config.reflection_prompt,
            config.distillation_prompt,
        );
        Self {
            embedder,
            retriever: None,
            observer: &NoopObserver,
            generator,
            reflector,
            curator: Curator::new(),
            store: ContextStore::new(),
        }
    }

    /// Attach an external document retriever.
    pub fn with_retriever(mut self, retriever: &'a dyn ExternalRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Attach a cycle observer.
    pub fn with_observer(mut self, observer: &'a dyn CycleObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Set the pruning policy applied at the end of every cycle.
    pub fn with_prune_policy(mut self, policy: Box<dyn PrunePolicy>) -> Self {
        self.curator = self.curator.with_prune_policy(policy);
        self
    }

    /// Seed the context. Call [`Orchestrator::materialize_embeddings`]
    /// afterwards if the seed entries are un-embedded and the first cycle
    /// should retrieve against them.
    pub fn with_context(mut self, context: Vec<LessonEntry>) -> Self {
        self.store.replace(context);
        self
    }

    /// The current evolutionary context.
    pub fn context(&self) -> &[LessonEntry] {
        self.store.entries()
    }

    /// Embed any stored entries that lack an embedding. Idempotent.
    pub async fn materialize_embeddings(&mut self) -> usize {
        self.store.materialize_embeddings(self.embedder).await
    }

    /// Run one full adaptation cycle for a query/feedback pair.
    ///
    /// `mode` is an observability label only; behavior is identical in both
    /// modes. Never returns an error: degraded stages substitute placeholder
    /// content and the report is always complete.
    pub async fn run_cycle(
        &mut self,
        query: &str,
        feedback: &str,
        mode: CycleMode,
        top_k: usize,
    ) -> CycleReport {
        self.observer.on_event(&CycleEvent::CycleStart { mode, query });

        // 1. External context, if a retriever is configured. Retriever
        //    failure degrades to an empty external context.
        let documents_text = match self.retriever {
            Some(retriever) => match retriever.retrieve(query).await {
                Ok(docs) => {
                    self.observer
                        .on_event(&CycleEvent::ExternalDocs { count: docs.len() });
                    docs.iter()
                        .map(|d| d.content.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n")
                }
                Err(e) => {
                    warn!("External retrieval failed: {e}");
                    self.observer.on_event(&CycleEvent::ExternalDocs { count: 0 });
                    String::new()
                }
            },
            None => {
                debug!("No external retriever configured");
                self.observer.on_event(&CycleEvent::ExternalDocs { count: 0 });
                String::new()
            }
        };

        // 2. Evolutionary context.
        let retrieved = self.store.retrieve(query, top_k, self.embedder).await;
        self.observer.on_event(&CycleEvent::LessonsRetrieved {
            count: retrieved.len(),
        });
        let lessons_text = retrieved
            .iter()
            .map(|entry| format!("- {}", entry.content))
            .collect::<Vec<_>>()
            .join("\n");

        // 3. Trajectory.
        let (trajectory, prompt) = self
            .generator
            .generate_trajectory(&lessons_text, &documents_text, query)
            .await;
        self.observer.on_event(&CycleEvent::TrajectoryProduced {
            degraded: trajectory.is_degraded(),
        });

        // 4. Reflection and distillation.
        let critique = self.reflector.reflect(trajectory.text(), feedback).await;
        self.observer.on_event(&CycleEvent::CritiqueProduced {
            degraded: critique.is_degraded(),
        });

        let (insights, fallback) = match self.reflector.distill_insights(critique.text()).await {
            Ok(insights) => (insights, false),
            Err(e) => {
                warn!("{e}; substituting sentinel insight");
                (vec![DISTILLATION_FALLBACK_INSIGHT.to_string()], true)
            }
        };
        self.observer.on_event(&CycleEvent::InsightsDistilled {
            count: insights.len(),
            fallback,
        });
        let delta = self.reflector.format_delta_entries(&insights);

        // 5. Curation, in fixed order.
        let synthesized = self.curator.synthesize_delta(delta, &retrieved);
        let merged = self.curator.merge_context(self.store.entries(), synthesized);
        let merged_len = merged.len();
        let pruned = self.curator.prune(self.curator.deduplicate(merged));
        self.observer.on_event(&CycleEvent::ContextCurated {
            merged: merged_len,
            retained: pruned.len(),
        });

        // 6. Atomic replacement, then embed the newcomers.
        self.store.replace(pruned);
        let materialized = self.store.materialize_embeddings(self.embedder).await;
        self.observer
            .on_event(&CycleEvent::EmbeddingsMaterialized { count: materialized });

        self.observer.on_event(&CycleEvent::CycleFinished {
            context_size: self.store.len(),
        });

        CycleReport {
            trajectory,
            prompt,
            context: self.store.snapshot(),
        }
    }

    /// Batch adaptation: reset to `initial_context`, then run one cycle per
    /// eligible dataset record, for `epochs` passes over the dataset.
    ///
    /// Returns the final context.
    pub async fn run_offline_adaptation(
        &mut self,
        dataset: &[TaskRecord],
        initial_context: Vec<LessonEntry>,
        epochs: usize,
        top_k: usize,
    ) -> Vec<LessonEntry> {
        info!(
            "Running offline adaptation: {} record(s), {epochs} epoch(s)",
            dataset.len()
        );
        self.reset(initial_context).await;

        for epoch in 1..=epochs {
            info!("Epoch {epoch}/{epochs}");
            for record in dataset {
                match record.eligible() {
                    Some((query, feedback)) => {
                        self.run_cycle(query, feedback, CycleMode::Offline, top_k)
                            .await;
                    }
                    None => debug!("Skipping record without query or feedback"),
                }
            }
        }
        self.store.snapshot()
    }

    /// Streaming adaptation: reset to `initial_context`, then consume the
    /// task stream once, running one cycle per eligible task.
    ///
    /// The stream may be unbounded; each task is processed independently and
    /// the context evolves monotonically across tasks within the run.
    pub async fn run_online_adaptation<S>(
        &mut self,
        mut tasks: S,
        initial_context: Vec<LessonEntry>,
        top_k: usize,
    ) -> Vec<LessonEntry>
    where
        S: Stream<Item = TaskRecord> + Unpin,
    {
        info!("Running online adaptation");
        self.reset(initial_context).await;

        while let Some(task) = tasks.next().await {
            match task.eligible() {
                Some((query, feedback)) => {
                    self.run_cycle(query, feedback, CycleMode::Online, top_k)
                        .await;
                }
                None => debug!("Skipping task without query or feedback"),
            }
        }
        self.store.snapshot()
    }

    async fn reset(&mut self, initial_context: Vec<LessonEntry>) {
        self.store.replace(initial_context);
        let materialized = self.store.materialize_embeddings(self.embedder).await;
        debug!("Initial context ready ({materialized} embeddings computed)");
    }
}
