//! Events emitted by a run, for UIs and hosts.
//!
//! Every event serializes as a JSON object with a `type` tag, so a host can
//! forward the stream verbatim (the CLI prints one event per line).

use serde::{Deserialize, Serialize};

/// One event in a run's output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The run has started: session, directory, model, and available tools.
    SystemInit {
        session_id: String,
        cwd: String,
        model: String,
        tools: Vec<String>,
        permission_mode: PermissionMode,
    },

    /// A streamed text block has opened.
    ContentBlockStart { index: u32 },

    /// A fragment of streamed text.
    ContentBlockDelta { index: u32, text: String },

    /// A streamed text block has closed.
    ContentBlockStop { index: u32 },

    /// A completed piece of assistant output.
    Assistant { content: AssistantContent },

    /// The outcome of a tool call, as fed back to the model.
    ToolResult {
        tool_use_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },

    /// Announces a tool call about to run. Informational: execution proceeds.
    PermissionRequest {
        tool_use_id: String,
        tool_name: String,
        input: serde_json::Value,
        mode: PermissionMode,
    },

    /// The final answer of a completed run.
    Result {
        result: String,
        is_error: bool,
        num_turns: u32,
        duration_ms: u64,
        total_cost_usd: f64,
    },

    /// Terminal session state.
    SessionStatus {
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl StreamEvent {
    /// Get the event type as a string (for logging/filtering).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SystemInit { .. } => "system_init",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool_result",
            Self::PermissionRequest { .. } => "permission_request",
            Self::Result { .. } => "result",
            Self::SessionStatus { .. } => "session_status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Error,
}

/// Tool permission handling. Only the always-proceed mode exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    #[default]
    Default,
}

/// Receives run events. Fire-and-forget: the runner never waits on it.
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &StreamEvent);
}

impl<F> EventObserver for F
where
    F: Fn(&StreamEvent) + Send + Sync,
{
    fn on_event(&self, event: &StreamEvent) {
        self(event)
    }
}

/// Drops every event.
pub struct NoopObserver;

impl EventObserver for NoopObserver {
    fn on_event(&self, _event: &StreamEvent) {}
}
