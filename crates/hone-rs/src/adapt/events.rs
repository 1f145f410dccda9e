//! Events and observers for the adaptation loop.
//!
//! The orchestrator emits a [`CycleEvent`] at each stage boundary of a cycle.
//! Callers implement [`CycleObserver`] to react to them for logging, metrics,
//! or progress display. Observers are strictly observational: they cannot
//! alter control flow, and the loop behaves identically with [`NoopObserver`].
//!
//! | Observer | Use case |
//! |----------|----------|
//! | [`NoopObserver`] | Tests or fire-and-forget runs |
//! | [`LoggingObserver`] | Structured logging via `tracing` |
//! | Custom `impl CycleObserver` | Metrics, dashboards |

use tracing::{debug, info, warn};

/// Label for the kind of adaptation run a cycle belongs to.
///
/// Observability only: the cycle itself behaves identically in both modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleMode {
    /// Streaming: each task is processed as it arrives.
    Online,
    /// Batch: a dataset is replayed for one or more epochs.
    Offline,
}

impl std::fmt::Display for CycleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleMode::Online => write!(f, "online"),
            CycleMode::Offline => write!(f, "offline"),
        }
    }
}

/// Events emitted by the orchestrator during an adaptation cycle.
#[derive(Debug)]
pub enum CycleEvent<'a> {
    /// A cycle is starting.
    CycleStart { mode: CycleMode, query: &'a str },
    /// External documents were retrieved (0 when no retriever is configured
    /// or the retriever failed).
    ExternalDocs { count: usize },
    /// Lessons were retrieved from the store for this query.
    LessonsRetrieved { count: usize },
    /// The generator produced a trajectory.
    TrajectoryProduced { degraded: bool },
    /// The reflector produced a critique.
    CritiqueProduced { degraded: bool },
    /// Insights were distilled from the critique. `fallback` is set when
    /// distillation failed and the sentinel insight was substituted.
    InsightsDistilled { count: usize, fallback: bool },
    /// Curation finished: `merged` entries went in, `retained` survived
    /// dedup and pruning.
    ContextCurated { merged: usize, retained: usize },
    /// New entries were embedded after the store replacement.
    EmbeddingsMaterialized { count: usize },
    /// The cycle completed (degraded or not, a cycle always completes).
    CycleFinished { context_size: usize },
}

/// Observer of [`CycleEvent`]s.
pub trait CycleObserver {
    fn on_event(&self, event: &CycleEvent<'_>) {
        let _ = event;
    }
}

/// Observer that ignores all events.
pub struct NoopObserver;

impl CycleObserver for NoopObserver {}

/// Observer that logs every event through `tracing`.
pub struct LoggingObserver;

impl CycleObserver for LoggingObserver {
    fn on_event(&self, event: &CycleEvent<'_>) {
        match event {
            CycleEvent::CycleStart { mode, query } => {
                info!("Adaptation cycle starting ({mode}): {query}");
            }
            CycleEvent::ExternalDocs { count } => {
                debug!("External context: {count} document(s)");
            }
            CycleEvent::LessonsRetrieved { count } => {
                debug!("Retrieved {count} lesson(s) from the store");
            }
            CycleEvent::TrajectoryProduced { degraded } => {
                if *degraded {
                    warn!("Trajectory generation degraded to placeholder");
                } else {
                    debug!("Trajectory generated");
                }
            }
            CycleEvent::CritiqueProduced { degraded } => {
                if *degraded {
                    warn!("Reflection degraded to placeholder");
                } else {
                    debug!("Critique produced");
                }
            }
            CycleEvent::InsightsDistilled { count, fallback } => {
                if *fallback {
                    warn!("Distillation failed; sentinel insight substituted");
                } else {
                    debug!("Distilled {count} insight(s)");
                }
            }
            CycleEvent::ContextCurated { merged, retained } => {
                debug!("Curated context: {merged} merged, {retained} retained");
            }
            CycleEvent::EmbeddingsMaterialized { count } => {
                debug!("Materialized {count} new embedding(s)");
            }
            CycleEvent::CycleFinished { context_size } => {
                info!("Adaptation cycle finished; context holds {context_size} lesson(s)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn mode_labels() {
        assert_eq!(CycleMode::Online.to_string(), "online");
        assert_eq!(CycleMode::Offline.to_string(), "offline");
    }

    #[test]
    fn custom_observer_sees_events() {
        struct Recorder(Mutex<Vec<String>>);
        impl CycleObserver for Recorder {
            fn on_event(&self, event: &CycleEvent<'_>) {
                self.0.lock().unwrap().push(format!("{event:?}"));
            }
        }

        let recorder = Recorder(Mutex::new(Vec::new()));
        recorder.on_event(&CycleEvent::CycleFinished { context_size: 3 });
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
