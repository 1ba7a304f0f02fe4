//! Sessions and the durable event log.
//!
//! The caller owns the `Session`; the agent loop only reads it and reports
//! changes through `SessionUpdate`. The `SessionStore` is the append-only log
//! the history builder replays when a session is resumed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::error::StoreError;

/// A conversation session bound to one working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (also the event log key)
    pub id: String,

    /// Confinement boundary for every file and process tool
    pub working_dir: PathBuf,

    /// Human-readable title
    #[serde(default)]
    pub title: String,

    /// Identifier of the session this one resumes, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_session_id: Option<String>,

    /// Text of the most recently submitted prompt, as recorded by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_prompt: Option<String>,
}

impl Session {
    /// Create a fresh session with a random identifier.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            working_dir: working_dir.into(),
            title: String::new(),
            resume_session_id: None,
            last_prompt: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn resuming(mut self, resume_session_id: impl Into<String>) -> Self {
        self.resume_session_id = Some(resume_session_id.into());
        self
    }
}

/// Partial session fields reported back to the caller for persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One entry of the durable session log.
///
/// Unknown `type` tags deserialize to `Other` and are skipped on replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PersistedEvent {
    /// A prompt submitted by the user
    UserPrompt { text: String },

    /// Free text produced by the assistant
    Text { text: String },

    /// A tool call issued by the assistant
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The outcome of a tool call
    ToolResult {
        tool_use_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },

    /// Anything this version does not understand
    #[serde(other)]
    Other,
}

/// A persisted event plus the time it was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub event: PersistedEvent,
}

/// Append-only persistence for session event logs.
///
/// Implementations: in-memory (tests, ephemeral hosts) and JSONL files.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The store name (e.g., "jsonl", "in_memory").
    fn name(&self) -> &str;

    /// Append one event to a session's log.
    async fn record_message(&self, session_id: &str, event: PersistedEvent) -> std::result::Result<(), StoreError>;

    /// Read a session's log in recording order. Unknown sessions yield an empty log.
    async fn get_session_history(&self, session_id: &str) -> std::result::Result<Vec<PersistedEvent>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_event_tags() {
        let event = PersistedEvent::UserPrompt { text: "hi".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"user_prompt","text":"hi"}"#);
    }

    #[test]
    fn unknown_event_kind_is_other() {
        let json = r#"{"type":"thinking","text":"hmm"}"#;
        let event: PersistedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, PersistedEvent::Other);
    }

    #[test]
    fn log_record_flattens_event() {
        let record = LogRecord {
            timestamp: Utc::now(),
            event: PersistedEvent::Text { text: "hello".into() },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hello");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn session_builder() {
        let session = Session::new("/tmp/project")
            .with_id("s1")
            .with_title("demo")
            .resuming("s0");
        assert_eq!(session.id, "s1");
        assert_eq!(session.title, "demo");
        assert_eq!(session.resume_session_id.as_deref(), Some("s0"));
        assert!(session.last_prompt.is_none());
    }
}
