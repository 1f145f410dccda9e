//! Convenience re-exports for common `hone-rs` types.
//!
//! Meant to be glob-imported when embedding the adaptation loop:
//!
//! ```ignore
//! use hone_rs::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of programs: the
//! clients, the [`Orchestrator`] + config, the capability traits, the store
//! types, and the observers. Specialized types (raw chat request/response
//! shapes, retry internals, the insight schema types) are intentionally
//! excluded — import those from their modules directly when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, OpenRouterClient, json_schema_for};

// ── Adaptation loop ─────────────────────────────────────────────────
pub use crate::adapt::{
    AdaptConfig, CompletionModel, CycleEvent, CycleMode, CycleObserver, CycleReport,
    DistillationError, Embedder, ExternalRetriever, KeepAll, LoggingObserver, ModelOutcome,
    NoopObserver, Orchestrator, PrunePolicy, RecencyBound, RetrievedDoc, TaskRecord,
};

// ── Store ───────────────────────────────────────────────────────────
pub use crate::store::{ContextStore, LessonEntry, Metadata};

// ── API layer ───────────────────────────────────────────────────────
pub use crate::api::{EmbeddingsClient, RetryConfig};
