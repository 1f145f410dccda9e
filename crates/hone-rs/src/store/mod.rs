//! Lesson storage and similarity retrieval.
//!
//! The [`ContextStore`] owns the *evolutionary context*: an ordered sequence
//! of [`LessonEntry`] values that conditions future generation. Ordering is
//! retrieval-irrelevant but stable, so runs are reproducible. The store is
//! deliberately a linear scan — curation bounds the context size, so there is
//! nothing to gain from an ANN index at this scale.
//!
//! Mutation discipline: entries are appended via [`ContextStore::add`], have
//! their embedding filled exactly once by
//! [`ContextStore::materialize_embeddings`], and are otherwise only replaced
//! wholesale via [`ContextStore::replace`] at the end of an adaptation cycle.
//! Nothing mutates individual entries mid-cycle.

use crate::adapt::capability::Embedder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Free-form metadata attached to a lesson. Opaque to the core; reserved for
/// provenance and usage counters layered on by callers.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A single unit of curated knowledge.
///
/// `content` is the unit of deduplication. `embedding` is derived from
/// `content` and never authoritative: dropping every embedding and
/// re-materializing yields an equivalent store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LessonEntry {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl LessonEntry {
    /// A fresh, un-embedded entry with empty metadata. This is the shape of a
    /// delta entry as produced by reflection.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embedding: None,
            metadata: Metadata::new(),
        }
    }
}

/// Cosine similarity between two vectors.
///
/// Zero-magnitude or length-mismatched vectors score 0.0 rather than NaN, so
/// a degenerate embedding can never poison the ranking sort.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Owner of the evolutionary context.
#[derive(Default)]
pub struct ContextStore {
    context: Vec<LessonEntry>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with an initial context.
    pub fn with_context(context: Vec<LessonEntry>) -> Self {
        Self { context }
    }

    /// Append a new lesson entry.
    ///
    /// Empty content is accepted but of undefined quality: it will never be
    /// embedded and therefore never retrieved. The curation path filters
    /// blank content before it reaches the store.
    pub fn add(&mut self, content: impl Into<String>, embedding: Option<Vec<f32>>, metadata: Metadata) {
        let entry = LessonEntry {
            content: content.into(),
            embedding,
            metadata,
        };
        debug!("Adding lesson: {}", entry.content);
        self.context.push(entry);
    }

    /// Retrieve up to `top_k` entries ranked by descending cosine similarity
    /// to the query.
    ///
    /// Entries without an embedding are excluded from ranking. Ties keep
    /// insertion order (the sort is stable). Returns an empty sequence when
    /// the store is empty, the query is empty, no entry has an embedding, or
    /// the query embedding cannot be computed (logged, not propagated).
    ///
    /// Read-only: no metadata or counters are touched.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        embedder: &dyn Embedder,
    ) -> Vec<LessonEntry> {
        if self.context.is_empty() || query.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let query_embedding = match embedder.encode(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to embed retrieval query: {e}");
                return Vec::new();
            }
        };

        let mut scored: Vec<(f32, &LessonEntry)> = self
            .context
            .iter()
            .filter_map(|entry| {
                entry
                    .embedding
                    .as_ref()
                    .map(|emb| (cosine_similarity(&query_embedding, emb), entry))
            })
            .collect();

        // Stable sort: equal scores preserve insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        debug!(
            "Retrieved {} of {} lessons for query",
            scored.len().min(top_k),
            self.context.len()
        );

        scored
            .into_iter()
            .take(top_k)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Compute and store embeddings for every entry that lacks one and has
    /// non-empty content.
    ///
    /// Idempotent: entries with an existing embedding are skipped, so
    /// repeated calls perform no recomputation and cannot drift. An entry
    /// whose encode fails is left un-embedded (and logged) so a later pass
    /// retries it.
    ///
    /// Returns the number of embeddings computed.
    pub async fn materialize_embeddings(&mut self, embedder: &dyn Embedder) -> usize {
        let mut computed = 0;
        for entry in &mut self.context {
            if entry.embedding.is_some() || entry.content.is_empty() {
                continue;
            }
            match embedder.encode(&entry.content).await {
                Ok(embedding) => {
                    entry.embedding = Some(embedding);
                    computed += 1;
                }
                Err(e) => {
                    warn!("Failed to embed lesson '{}': {e}", entry.content);
                }
            }
        }
        if computed > 0 {
            debug!("Materialized {computed} embeddings");
        }
        computed
    }

    /// Replace the whole context atomically. Used at the end of a cycle, and
    /// when resetting the store for a new adaptation run.
    pub fn replace(&mut self, context: Vec<LessonEntry>) {
        self.context = context;
    }

    /// A snapshot copy of the current context.
    pub fn snapshot(&self) -> Vec<LessonEntry> {
        self.context.clone()
    }

    /// Borrow the current context.
    pub fn entries(&self) -> &[LessonEntry] {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.context.len()
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapt::capability::EmbedFuture;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Embedder fake: maps known texts to fixed vectors and counts calls.
    struct ScriptedEmbedder {
        vectors: Vec<(&'static str, Vec<f32>)>,
        calls: AtomicUsize,
    }

    impl ScriptedEmbedder {
        fn new(vectors: Vec<(&'static str, Vec<f32>)>) -> Self {
            Self {
                vectors,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    impl Embedder for ScriptedEmbedder {
        fn encode<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            let found = self
                .vectors
                .iter()
                .find(|(t, _)| *t == text)
                .map(|(_, v)| v.clone());
            Box::pin(async move {
                found.ok_or_else(|| format!("no scripted vector for '{text}'"))
            })
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn encode<'a>(&'a self, _text: &'a str) -> EmbedFuture<'a> {
            Box::pin(async { Err("embeddings API HTTP 500: down".to_string()) })
        }
    }

    #[test]
    fn cosine_basics() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!(cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) < 0.0);
    }

    #[tokio::test]
    async fn empty_store_retrieves_nothing() {
        let store = ContextStore::new();
        let embedder = ScriptedEmbedder::new(vec![("q", vec![1.0, 0.0])]);
        let result = store.retrieve("q", 5, &embedder).await;
        assert!(result.is_empty());
        assert_eq!(embedder.call_count(), 0, "no encode for an empty store");
    }

    #[tokio::test]
    async fn empty_query_retrieves_nothing() {
        let mut store = ContextStore::new();
        store.add("lesson", Some(vec![1.0, 0.0]), Metadata::new());
        let embedder = ScriptedEmbedder::new(vec![]);
        assert!(store.retrieve("", 5, &embedder).await.is_empty());
    }

    #[tokio::test]
    async fn unembedded_entries_excluded_from_ranking() {
        let mut store = ContextStore::new();
        store.add("no embedding yet", None, Metadata::new());
        let embedder = ScriptedEmbedder::new(vec![("q", vec![1.0, 0.0])]);
        assert!(store.retrieve("q", 5, &embedder).await.is_empty());
    }

    #[tokio::test]
    async fn ranking_orders_by_similarity() {
        // Query along the x axis; entries at cosine ≈ 0.9, 0.1, 0.5.
        let mut store = ContextStore::new();
        store.add("high", Some(vec![0.9, 0.435_889_9]), Metadata::new());
        store.add("low", Some(vec![0.1, 0.994_987_4]), Metadata::new());
        store.add("mid", Some(vec![0.5, 0.866_025_4]), Metadata::new());
        let embedder = ScriptedEmbedder::new(vec![("q", vec![1.0, 0.0])]);

        let result = store.retrieve("q", 2, &embedder).await;
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].content, "high");
        assert_eq!(result[1].content, "mid");
    }

    #[tokio::test]
    async fn retrieval_bound_is_min_of_k_and_embedded() {
        let mut store = ContextStore::new();
        store.add("a", Some(vec![1.0, 0.0]), Metadata::new());
        store.add("b", Some(vec![0.0, 1.0]), Metadata::new());
        store.add("c", None, Metadata::new());
        let embedder = ScriptedEmbedder::new(vec![("q", vec![1.0, 0.0])]);

        assert_eq!(store.retrieve("q", 5, &embedder).await.len(), 2);
        assert_eq!(store.retrieve("q", 1, &embedder).await.len(), 1);
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let mut store = ContextStore::new();
        store.add("first", Some(vec![1.0, 0.0]), Metadata::new());
        store.add("second", Some(vec![2.0, 0.0]), Metadata::new());
        let embedder = ScriptedEmbedder::new(vec![("q", vec![1.0, 0.0])]);

        // Both entries score exactly 1.0; stable sort keeps insertion order.
        let result = store.retrieve("q", 2, &embedder).await;
        assert_eq!(result[0].content, "first");
        assert_eq!(result[1].content, "second");
    }

    #[tokio::test]
    async fn failed_query_embed_degrades_to_empty() {
        let mut store = ContextStore::new();
        store.add("lesson", Some(vec![1.0]), Metadata::new());
        assert!(store.retrieve("q", 5, &FailingEmbedder).await.is_empty());
    }

    #[tokio::test]
    async fn materialize_is_idempotent() {
        let mut store = ContextStore::new();
        store.add("alpha", None, Metadata::new());
        store.add("beta", None, Metadata::new());
        store.add("", None, Metadata::new()); // blank content is never embedded
        let embedder = ScriptedEmbedder::new(vec![
            ("alpha", vec![1.0, 0.0]),
            ("beta", vec![0.0, 1.0]),
        ]);

        assert_eq!(store.materialize_embeddings(&embedder).await, 2);
        let first_pass = store.snapshot();

        // Second pass performs zero encodes and changes no values.
        let calls_before = embedder.call_count();
        assert_eq!(store.materialize_embeddings(&embedder).await, 0);
        assert_eq!(embedder.call_count(), calls_before);
        assert_eq!(store.snapshot(), first_pass);
    }

    #[tokio::test]
    async fn failed_encode_leaves_entry_retryable() {
        let mut store = ContextStore::new();
        store.add("alpha", None, Metadata::new());
        assert_eq!(store.materialize_embeddings(&FailingEmbedder).await, 0);
        assert!(store.entries()[0].embedding.is_none());

        // A later pass with a working embedder picks the entry up.
        let embedder = ScriptedEmbedder::new(vec![("alpha", vec![1.0])]);
        assert_eq!(store.materialize_embeddings(&embedder).await, 1);
    }

    #[test]
    fn replace_swaps_whole_context() {
        let mut store = ContextStore::new();
        store.add("old", None, Metadata::new());
        store.replace(vec![LessonEntry::new("new")]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.entries()[0].content, "new");
    }

    #[test]
    fn lesson_entry_round_trips_without_embedding_field() {
        let entry = LessonEntry::new("memoization works well with a dictionary");
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("embedding").is_none());
        assert!(json.get("metadata").is_none());
        let back: LessonEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
