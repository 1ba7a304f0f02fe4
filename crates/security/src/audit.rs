//! Audit logging: structured records of refused tool side effects.
//!
//! Every record is a refusal. Records are for review only; nothing in the
//! agent loop branches on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// One refused access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
    /// Which tool attempted the access
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Types of auditable security events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A path outside the working directory was requested
    PathDenied { path: String },
    /// A shell command matched the deny-list
    CommandDenied { command: String },
}

/// Where audit entries go besides the in-memory list.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Keeps refusals in memory and forwards each one to its sinks.
///
/// `Default` forwards to [`TracingSink`]; `new()` has no sinks.
pub struct AuditLogger {
    entries: Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::with_sinks(vec![Box::new(TracingSink)])
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks,
        }
    }

    /// Record a refusal.
    pub fn log(&self, event: AuditEvent, actor: &str, reason: Option<String>) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.into(),
            reason,
        };

        for sink in &self.sinks {
            sink.record(&entry);
        }

        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }

    /// Snapshot of the recorded entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Emits each entry as a `warn!` event on the `audit` target.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        match &entry.event {
            AuditEvent::PathDenied { path } => tracing::warn!(
                target: "audit",
                actor = %entry.actor,
                path = %path,
                reason = entry.reason.as_deref().unwrap_or(""),
                "Path access denied"
            ),
            AuditEvent::CommandDenied { command } => tracing::warn!(
                target: "audit",
                actor = %entry.actor,
                command = %command,
                reason = entry.reason.as_deref().unwrap_or(""),
                "Command denied"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn log_and_retrieve_entries() {
        let logger = AuditLogger::new();
        logger.log(
            AuditEvent::PathDenied { path: "../../etc/passwd".into() },
            "Read",
            None,
        );
        logger.log(
            AuditEvent::CommandDenied { command: "mkfs /dev/sda".into() },
            "Bash",
            Some("matched 'mkfs'".into()),
        );

        assert_eq!(logger.count(), 2);
        let entries = logger.entries();
        assert_eq!(entries[0].actor, "Read");
        assert_eq!(entries[1].actor, "Bash");
        assert_eq!(entries[1].reason.as_deref(), Some("matched 'mkfs'"));
    }

    #[test]
    fn entry_serializes_flat() {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event: AuditEvent::PathDenied { path: "/etc/shadow".into() },
            actor: "Write".into(),
            reason: None,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "path_denied");
        assert_eq!(json["path"], "/etc/shadow");
        assert!(json.get("reason").is_none());

        let back: AuditEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.event, entry.event);
    }

    #[test]
    fn custom_sink_receives_events() {
        struct TestSink {
            received: Arc<Mutex<Vec<String>>>,
        }

        impl AuditSink for TestSink {
            fn record(&self, entry: &AuditEntry) {
                self.received.lock().unwrap().push(entry.actor.clone());
            }
        }

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = TestSink { received: received.clone() };
        let logger = AuditLogger::with_sinks(vec![Box::new(sink)]);

        logger.log(
            AuditEvent::PathDenied { path: "/root".into() },
            "Glob",
            None,
        );

        let sink_entries = received.lock().unwrap();
        assert_eq!(sink_entries.as_slice(), ["Glob"]);
    }

    #[test]
    fn debug_format() {
        let logger = AuditLogger::new();
        let debug_str = format!("{logger:?}");
        assert!(debug_str.contains("entry_count"));
    }
}
