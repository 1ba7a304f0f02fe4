//! Memory trait: durable notes the agent keeps across sessions.
//!
//! The Memory tool writes to it, and the agent loop reads it back into the
//! memory section of the first prompt when the memory feature is enabled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;

/// A single memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique ID for this memory (assigned by the backend when empty)
    pub id: String,

    /// The content of the memory
    pub content: String,

    /// Tags for categorization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// When this memory was created
    pub created_at: DateTime<Utc>,

    /// Relevance score (set by search operations)
    #[serde(default)]
    pub score: f32,
}

impl MemoryEntry {
    /// A new entry with no ID yet.
    pub fn new(content: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id: String::new(),
            content: content.into(),
            tags,
            created_at: Utc::now(),
            score: 0.0,
        }
    }
}

/// A query for searching memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// The search text (case-insensitive substring; empty matches everything)
    pub text: String,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Filter by tags (any match)
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_limit() -> usize {
    10
}

impl MemoryQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: default_limit(),
            tags: Vec::new(),
        }
    }
}

/// The core MemoryBackend trait.
///
/// Implementations: JSONL file, in-memory (for testing).
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Store a new memory entry, returning its ID.
    async fn store(&self, entry: MemoryEntry) -> std::result::Result<String, MemoryError>;

    /// Search memories by query, best match first.
    async fn search(&self, query: MemoryQuery) -> std::result::Result<Vec<MemoryEntry>, MemoryError>;

    /// Most recent memories first.
    async fn list(&self, limit: usize) -> std::result::Result<Vec<MemoryEntry>, MemoryError>;

    /// Delete a memory by ID.
    async fn delete(&self, id: &str) -> std::result::Result<bool, MemoryError>;

    /// Get total memory count.
    async fn count(&self) -> std::result::Result<usize, MemoryError>;
}
