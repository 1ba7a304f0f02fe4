//! JSON-lines session log.
//!
//! Each session is one file, `<dir>/<session-id>.jsonl`, holding one
//! `LogRecord` per line. Records are only ever appended. Lines that fail to
//! parse are skipped on read so a torn write cannot poison a whole session.

use async_trait::async_trait;
use chrono::Utc;
use skiff_core::error::StoreError;
use skiff_core::session::{LogRecord, PersistedEvent, SessionStore};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct JsonlSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSessionStore {
    /// Store logs under `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a session's log file.
    pub fn log_path(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Storage(format!(
                "Invalid session id: {session_id:?}"
            )));
        }
        Ok(self.dir.join(format!("{session_id}.jsonl")))
    }

    /// The session whose log was written most recently, if any.
    pub async fn latest_session(&self) -> Result<Option<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Storage(format!("Failed to list sessions: {e}"))),
        };

        let mut latest: Option<(std::time::SystemTime, String)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to list sessions: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                continue;
            };
            if latest.as_ref().is_none_or(|(t, _)| modified > *t) {
                latest = Some((modified, id.to_string()));
            }
        }
        Ok(latest.map(|(_, id)| id))
    }
}

#[async_trait]
impl SessionStore for JsonlSessionStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn record_message(&self, session_id: &str, event: PersistedEvent) -> Result<(), StoreError> {
        let path = self.log_path(session_id)?;
        let record = LogRecord {
            timestamp: Utc::now(),
            event,
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize event: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to create session directory: {e}")))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open {}: {e}", path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to append to {}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to flush {}: {e}", path.display())))?;

        debug!(session_id, path = %path.display(), "Recorded session event");
        Ok(())
    }

    async fn get_session_history(&self, session_id: &str) -> Result<Vec<PersistedEvent>, StoreError> {
        let path = self.log_path(session_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let events = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<LogRecord>(line) {
                Ok(record) => Some(record.event),
                Err(e) => {
                    warn!(session_id, line = n + 1, error = %e, "Skipping unreadable session record");
                    None
                }
            })
            .collect();
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlSessionStore::new(dir.path().join("sessions"));

        store
            .record_message("abc-123", PersistedEvent::UserPrompt { text: "list files".into() })
            .await
            .unwrap();
        store
            .record_message(
                "abc-123",
                PersistedEvent::ToolUse {
                    id: "call_1".into(),
                    name: "Glob".into(),
                    input: json!({"pattern": "*"}),
                },
            )
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("sessions/abc-123.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains(r#""type":"user_prompt""#));

        let history = store.get_session_history("abc-123").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], PersistedEvent::UserPrompt { text: "list files".into() });
    }

    #[tokio::test]
    async fn missing_session_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlSessionStore::new(dir.path());
        assert!(store.get_session_history("never-seen").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skips_corrupted_and_unknown_lines() {
        let dir = tempfile::tempdir().unwrap();
        let lines = [
            r#"{"timestamp":"2026-01-01T00:00:00Z","type":"user_prompt","text":"hi"}"#,
            "not json at all",
            r#"{"timestamp":"2026-01-01T00:00:01Z","type":"thinking","text":"hmm"}"#,
            r#"{"timestamp":"2026-01-01T00:00:02Z","type":"text","text":"hello"}"#,
        ];
        std::fs::write(dir.path().join("s1.jsonl"), lines.join("\n")).unwrap();

        let store = JsonlSessionStore::new(dir.path());
        let history = store.get_session_history("s1").await.unwrap();
        assert_eq!(
            history,
            vec![
                PersistedEvent::UserPrompt { text: "hi".into() },
                PersistedEvent::Other,
                PersistedEvent::Text { text: "hello".into() },
            ]
        );
    }

    #[tokio::test]
    async fn latest_session_is_most_recently_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlSessionStore::new(dir.path().join("sessions"));
        assert_eq!(store.latest_session().await.unwrap(), None);

        store
            .record_message("older", PersistedEvent::Text { text: "a".into() })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        store
            .record_message("newer", PersistedEvent::Text { text: "b".into() })
            .await
            .unwrap();
        std::fs::write(dir.path().join("sessions/notes.txt"), "ignored").unwrap();

        assert_eq!(store.latest_session().await.unwrap().as_deref(), Some("newer"));
    }

    #[tokio::test]
    async fn rejects_path_like_session_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlSessionStore::new(dir.path());
        let err = store
            .record_message("../escape", PersistedEvent::Text { text: "x".into() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid session id"));
    }
}
