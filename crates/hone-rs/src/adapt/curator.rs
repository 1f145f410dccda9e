//! Context curation: merge, deduplicate, prune.
//!
//! The curator is the only component that decides what the lesson pool
//! keeps. All of its operations are synchronous pure transforms over owned
//! sequences; nothing here suspends or touches the network.
//!
//! The order within a cycle is fixed: synthesize → merge → deduplicate →
//! prune. Dedup runs after merge so duplicates survive no path into the
//! pool (including ones a custom synthesize step might introduce), and
//! before pruning so eviction never acts on a redundant set and biases
//! nothing.

use crate::store::LessonEntry;
use std::collections::HashSet;
use tracing::debug;

// ── Prune policies ─────────────────────────────────────────────────

/// Strategy for bounding the context size.
///
/// Contract: `prune` never reorders surviving entries and never drops the
/// most-recently-added entry. Beyond that, eviction is policy.
pub trait PrunePolicy: Send + Sync {
    fn prune(&self, context: Vec<LessonEntry>) -> Vec<LessonEntry>;

    /// Short label for logging.
    fn name(&self) -> &'static str;
}

/// No-op policy: the context grows without bound. This is the default;
/// callers must not assume bounded size unless they configure a real policy.
pub struct KeepAll;

impl PrunePolicy for KeepAll {
    fn prune(&self, context: Vec<LessonEntry>) -> Vec<LessonEntry> {
        context
    }

    fn name(&self) -> &'static str {
        "keep-all"
    }
}

/// Bounded-size-by-recency policy: keeps the newest `max_entries`, in order.
///
/// Keeping a suffix trivially satisfies both contract clauses: survivors stay
/// in order, and the most recently added entry is always in the suffix.
pub struct RecencyBound {
    max_entries: usize,
}

impl RecencyBound {
    /// A bound of 0 would discard new knowledge the moment it arrives, so
    /// the limit is clamped to at least 1.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
        }
    }
}

impl PrunePolicy for RecencyBound {
    fn prune(&self, mut context: Vec<LessonEntry>) -> Vec<LessonEntry> {
        if context.len() > self.max_entries {
            let dropped = context.len() - self.max_entries;
            debug!("Pruning {dropped} oldest lesson(s) (limit {})", self.max_entries);
            context.drain(..dropped);
        }
        context
    }

    fn name(&self) -> &'static str {
        "recency-bound"
    }
}

// ── Curator ────────────────────────────────────────────────────────

/// Integrates delta entries into the evolutionary context while eliminating
/// redundancy and bounding size.
pub struct Curator {
    prune_policy: Box<dyn PrunePolicy>,
}

impl Default for Curator {
    fn default() -> Self {
        Self {
            prune_policy: Box::new(KeepAll),
        }
    }
}

impl Curator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the prune policy.
    pub fn with_prune_policy(mut self, policy: Box<dyn PrunePolicy>) -> Self {
        self.prune_policy = policy;
        self
    }

    /// Normalize delta entries against the retrieved context.
    ///
    /// Policy hook for richer consolidation (e.g. rewriting near-duplicates
    /// against the lessons that were just retrieved). The current behavior is
    /// pass-through.
    pub fn synthesize_delta(
        &self,
        delta: Vec<LessonEntry>,
        _retrieved: &[LessonEntry],
    ) -> Vec<LessonEntry> {
        debug!("Synthesizing delta of {} entries", delta.len());
        delta
    }

    /// Append delta entries whose content does not already exist.
    ///
    /// Existing entries keep their order; delta entries are appended in
    /// order. Blank-content delta entries are not admitted (store invariant:
    /// curated content is never empty). Admitted content joins the seen-set,
    /// so no two entries share identical content immediately after merge.
    pub fn merge_context(
        &self,
        existing: &[LessonEntry],
        delta: Vec<LessonEntry>,
    ) -> Vec<LessonEntry> {
        let mut seen: HashSet<String> = existing.iter().map(|e| e.content.clone()).collect();

        let mut merged: Vec<LessonEntry> = existing.to_vec();
        for entry in delta {
            if entry.content.is_empty() {
                continue;
            }
            if seen.insert(entry.content.clone()) {
                merged.push(entry);
            }
        }
        merged
    }

    /// Keep the first occurrence of each distinct content, in order.
    pub fn deduplicate(&self, context: Vec<LessonEntry>) -> Vec<LessonEntry> {
        let mut seen: HashSet<String> = HashSet::new();
        let before = context.len();
        let deduplicated: Vec<LessonEntry> = context
            .into_iter()
            .filter(|entry| seen.insert(entry.content.clone()))
            .collect();
        if deduplicated.len() < before {
            debug!("Deduplication removed {} entries", before - deduplicated.len());
        }
        deduplicated
    }

    /// Apply the configured prune policy.
    pub fn prune(&self, context: Vec<LessonEntry>) -> Vec<LessonEntry> {
        debug!("Pruning context with policy '{}'", self.prune_policy.name());
        self.prune_policy.prune(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(contents: &[&str]) -> Vec<LessonEntry> {
        contents.iter().map(|c| LessonEntry::new(*c)).collect()
    }

    fn contents(context: &[LessonEntry]) -> Vec<&str> {
        context.iter().map(|e| e.content.as_str()).collect()
    }

    #[test]
    fn merge_appends_only_new_content() {
        let curator = Curator::new();
        let merged = curator.merge_context(&entries(&["a", "b"]), entries(&["b", "c"]));
        assert_eq!(contents(&merged), vec!["a", "b", "c"]);
    }

    #[test]
    fn merge_skips_blank_delta_entries() {
        let curator = Curator::new();
        let merged = curator.merge_context(&entries(&["a"]), entries(&["", "b"]));
        assert_eq!(contents(&merged), vec!["a", "b"]);
    }

    #[test]
    fn merge_collapses_cross_delta_duplicates() {
        let curator = Curator::new();
        let merged = curator.merge_context(&entries(&["a"]), entries(&["x", "x"]));
        assert_eq!(contents(&merged), vec!["a", "x"]);

        // Dedup after merge is still a fixed part of the curation order; on
        // an already-unique sequence it is the identity.
        let deduped = curator.deduplicate(merged.clone());
        assert_eq!(deduped, merged);
    }

    #[test]
    fn merge_never_produces_duplicate_content() {
        let curator = Curator::new();
        let merged = curator.merge_context(
            &entries(&["a", "b", "c"]),
            entries(&["c", "d", "a"]),
        );
        let unique: std::collections::HashSet<_> = contents(&merged).into_iter().collect();
        assert_eq!(unique.len(), merged.len());
    }

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let curator = Curator::new();
        let deduped = curator.deduplicate(entries(&["a", "b", "a", "c", "b"]));
        assert_eq!(contents(&deduped), vec!["a", "b", "c"]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let curator = Curator::new();
        let once = curator.deduplicate(entries(&["a", "b", "a"]));
        let twice = curator.deduplicate(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn keep_all_is_identity() {
        let curator = Curator::new();
        let context = entries(&["a", "b", "c"]);
        assert_eq!(curator.prune(context.clone()), context);
    }

    #[test]
    fn recency_bound_keeps_newest_in_order() {
        let curator = Curator::new().with_prune_policy(Box::new(RecencyBound::new(2)));
        let pruned = curator.prune(entries(&["oldest", "mid", "newest"]));
        assert_eq!(contents(&pruned), vec!["mid", "newest"]);
    }

    #[test]
    fn recency_bound_at_boundary_keeps_newest_entry() {
        // Exactly at the limit: nothing is dropped, in particular not the
        // most recently added entry.
        let curator = Curator::new().with_prune_policy(Box::new(RecencyBound::new(3)));
        let context = entries(&["a", "b", "newest"]);
        assert_eq!(curator.prune(context.clone()), context);
    }

    #[test]
    fn recency_bound_clamps_zero_to_one() {
        let policy = RecencyBound::new(0);
        let pruned = policy.prune(entries(&["a", "newest"]));
        assert_eq!(contents(&pruned), vec!["newest"]);
    }

    #[test]
    fn synthesize_is_pass_through() {
        let curator = Curator::new();
        let delta = entries(&["a"]);
        assert_eq!(
            curator.synthesize_delta(delta.clone(), &entries(&["b"])),
            delta
        );
    }
}
