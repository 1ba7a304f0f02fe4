//! In-memory backends, useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use skiff_core::error::{MemoryError, StoreError};
use skiff_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use skiff_core::session::{LogRecord, PersistedEvent, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Session logs kept in a map keyed by session ID.
#[derive(Default)]
pub struct InMemorySessionStore {
    logs: Arc<RwLock<HashMap<String, Vec<LogRecord>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw records for a session, timestamps included.
    pub async fn records(&self, session_id: &str) -> Vec<LogRecord> {
        self.logs
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn record_message(&self, session_id: &str, event: PersistedEvent) -> Result<(), StoreError> {
        self.logs
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(LogRecord {
                timestamp: Utc::now(),
                event,
            });
        Ok(())
    }

    async fn get_session_history(&self, session_id: &str) -> Result<Vec<PersistedEvent>, StoreError> {
        Ok(self
            .records(session_id)
            .await
            .into_iter()
            .map(|r| r.event)
            .collect())
    }
}

/// An in-memory backend that stores memories in a Vec.
#[derive(Default)]
pub struct InMemoryBackend {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
        Ok(id)
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
        Ok(crate::rank(&self.entries.read().await, &query))
    }

    async fn list(&self, limit: usize) -> Result<Vec<MemoryEntry>, MemoryError> {
        Ok(crate::newest(&self.entries.read().await, limit))
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut entries = self.entries.write().await;
        let len_before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() < len_before)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }
}
