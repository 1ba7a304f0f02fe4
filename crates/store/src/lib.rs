//! Storage backends for skiff.
//!
//! Session logs:
//! - **jsonl**: one `<session-id>.jsonl` file per session (default)
//! - **in_memory**: ephemeral, for tests and embedding hosts
//!
//! Memory backends:
//! - **file**: JSON-lines file under the config directory
//! - **in_memory**: ephemeral

pub mod file_backend;
pub mod in_memory;
pub mod session_log;

pub use file_backend::FileBackend;
pub use in_memory::{InMemoryBackend, InMemorySessionStore};
pub use session_log::JsonlSessionStore;

use skiff_core::memory::{MemoryEntry, MemoryQuery};

/// Keyword relevance shared by the memory backends.
///
/// Returns `None` when the entry does not match the query at all.
pub(crate) fn score(entry: &MemoryEntry, query: &MemoryQuery) -> Option<f32> {
    let needle = query.text.to_lowercase();
    let haystack = entry.content.to_lowercase();

    let tag_match = query.tags.is_empty() || query.tags.iter().any(|t| entry.tags.contains(t));
    if !tag_match || !haystack.contains(&needle) {
        return None;
    }
    if needle.is_empty() {
        return Some(0.0);
    }

    let occurrences = haystack.matches(&needle).count();
    Some(occurrences as f32 / (entry.content.len() as f32 / 100.0).max(1.0))
}

/// Rank entries by `score`, best first, and apply the query limit.
pub(crate) fn rank(entries: &[MemoryEntry], query: &MemoryQuery) -> Vec<MemoryEntry> {
    let mut results: Vec<MemoryEntry> = entries
        .iter()
        .filter_map(|e| {
            score(e, query).map(|s| {
                let mut e = e.clone();
                e.score = s;
                e
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    results.truncate(query.limit);
    results
}

/// Most recent first.
pub(crate) fn newest(entries: &[MemoryEntry], limit: usize) -> Vec<MemoryEntry> {
    let mut out = entries.to_vec();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out.truncate(limit);
    out
}
