//! File-based memory backend: persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded `MemoryEntry`. The default location is
//! `~/.skiff/memory/memories.jsonl`.

use async_trait::async_trait;
use skiff_core::error::MemoryError;
use skiff_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// A file-backed memory store using JSONL (one JSON object per line).
///
/// Entries are loaded into memory on creation and flushed to disk on every
/// mutation. This gives fast reads with durable writes.
pub struct FileBackend {
    path: PathBuf,
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl FileBackend {
    /// Open the backend at `path`, loading any existing entries.
    ///
    /// A missing file starts empty; it is created on first write.
    pub fn new(path: PathBuf) -> Self {
        let entries = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = entries.len(), "File memory backend loaded");
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<MemoryEntry> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<MemoryEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted memory entry");
                    None
                }
            })
            .collect()
    }

    async fn flush(&self) -> Result<(), MemoryError> {
        let entries = self.entries.read().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for entry in entries.iter() {
            let line = serde_json::to_string(entry).map_err(|e| {
                MemoryError::Storage(format!("Failed to serialize memory entry: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        tokio::fs::write(&self.path, &content)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl MemoryBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
        self.flush().await?;
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
        let deleted = entries.len() < len_before;
        drop(entries);
        if deleted {
            self.flush().await?;
        }
        Ok(deleted)
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn store_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory").join("memories.jsonl");

        let mem = FileBackend::new(path.clone());
        let id = mem
            .store(MemoryEntry::new("Project uses tokio", vec!["stack".into()]))
            .await
            .unwrap();
        assert!(!id.is_empty());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Project uses tokio"));

        let mem2 = FileBackend::new(path);
        let listed = mem2.list(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }

    #[tokio::test]
    async fn search_finds_by_keyword() {
        let dir = tempfile::tempdir().unwrap();
        let mem = FileBackend::new(dir.path().join("m.jsonl"));
        mem.store(MemoryEntry::new("The user prefers Rust", vec![])).await.unwrap();
        mem.store(MemoryEntry::new("Python is also good", vec![])).await.unwrap();
        mem.store(MemoryEntry::new("Rust has great performance", vec![])).await.unwrap();

        let results = mem.search(MemoryQuery::text("rust")).await.unwrap();
        assert_eq!(results.len(), 2);
        for r in &results {
            assert!(r.content.to_lowercase().contains("rust"));
        }
    }

    #[tokio::test]
    async fn delete_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.jsonl");

        let mem = FileBackend::new(path.clone());
        let id = mem.store(MemoryEntry::new("To be deleted", vec![])).await.unwrap();
        assert!(mem.delete(&id).await.unwrap());

        let mem2 = FileBackend::new(path);
        assert_eq!(mem2.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn handles_corrupted_lines() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, r#"{{"id":"1","content":"valid","created_at":"2026-01-01T00:00:00Z"}}"#).unwrap();
        writeln!(tmp, "this is not json").unwrap();
        writeln!(tmp, r#"{{"id":"2","content":"also valid","tags":["x"],"created_at":"2026-01-01T00:00:00Z"}}"#).unwrap();

        let mem = FileBackend::new(tmp.path().to_path_buf());
        assert_eq!(mem.count().await.unwrap(), 2);
    }
}
