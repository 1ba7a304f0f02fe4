//! Conversation history reconstruction.
//!
//! Replays the persisted event log into the message list submitted to the
//! model. Assistant text and tool results between two user prompts collapse
//! into a single assistant message; tool results are rendered inline as
//! annotated blocks rather than structured tool messages, and `tool_use`
//! entries are skipped since the calls are implied by their results.

use skiff_core::memory::MemoryEntry;
use skiff_core::message::Message;
use skiff_core::session::PersistedEvent;
use std::path::PathBuf;

/// Environment facts that shape the system message and the new prompt.
#[derive(Debug, Clone)]
pub struct HistoryContext {
    pub platform: String,
    pub working_dir: PathBuf,
    /// `YYYY-MM-DD`
    pub date: String,
    pub memory_section: Option<String>,
}

impl HistoryContext {
    /// Context for the current machine and today's date.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            working_dir: working_dir.into(),
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            memory_section: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn with_memory_section(mut self, section: Option<String>) -> Self {
        self.memory_section = section.filter(|s| !s.trim().is_empty());
        self
    }
}

pub fn system_prompt(ctx: &HistoryContext) -> String {
    format!(
        "You are an autonomous assistant working in a local workspace.\n\
         Platform: {}\n\
         Working directory: {}\n\n\
         Use the available tools to inspect and change files and run commands. \
         All paths are relative to the working directory; access outside it is refused. \
         When the task is complete, reply with a final answer and no tool calls.",
        ctx.platform,
        ctx.working_dir.display()
    )
}

/// Render stored memories as a prompt section. `None` when there are none.
pub fn render_memory_section(memories: &[MemoryEntry]) -> Option<String> {
    if memories.is_empty() {
        return None;
    }
    let lines: String = memories.iter().map(|m| format!("- {}\n", m.content)).collect();
    Some(format!("[Long-Term Memory]\n{lines}"))
}

/// The user message for a newly submitted prompt.
pub fn format_prompt(prompt: &str, ctx: &HistoryContext) -> String {
    match &ctx.memory_section {
        Some(memory) => format!("{}\n\n[Date: {}]\n{prompt}", memory.trim_end(), ctx.date),
        None => format!("[Date: {}]\n{prompt}", ctx.date),
    }
}

/// The last user prompt seen in `events`, falling back to `last_prompt`
/// when the log contains none.
pub fn last_user_prompt<'a>(events: &'a [PersistedEvent], last_prompt: Option<&'a str>) -> Option<&'a str> {
    events
        .iter()
        .rev()
        .find_map(|e| match e {
            PersistedEvent::UserPrompt { text } => Some(text.as_str()),
            _ => None,
        })
        .or(last_prompt)
}

/// Whether `new_prompt` would be appended by [`build_history`].
pub fn is_new_prompt(events: &[PersistedEvent], new_prompt: &str, last_prompt: Option<&str>) -> bool {
    last_user_prompt(events, last_prompt) != Some(new_prompt)
}

fn render_tool_result(tool_name: &str, content: &str, is_error: bool) -> String {
    let status = if is_error { " (error)" } else { "" };
    format!("[Tool result: {tool_name}{status}]\n{content}\n[/Tool result]")
}

fn flush(buffer: &mut Vec<String>, messages: &mut Vec<Message>) {
    if !buffer.is_empty() {
        messages.push(Message::assistant(buffer.join("\n\n")));
        buffer.clear();
    }
}

/// Build the message list for submission.
///
/// A new prompt identical to the last seen user prompt is not appended again,
/// so resubmitting the same prompt against a replayed log is idempotent.
pub fn build_history(
    events: &[PersistedEvent],
    new_prompt: Option<&str>,
    last_prompt: Option<&str>,
    ctx: &HistoryContext,
) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt(ctx))];
    let mut buffer: Vec<String> = Vec::new();

    for event in events {
        match event {
            PersistedEvent::UserPrompt { text } => {
                flush(&mut buffer, &mut messages);
                messages.push(Message::user(text.clone()));
            }
            PersistedEvent::Text { text } => {
                if !text.is_empty() {
                    buffer.push(text.clone());
                }
            }
            PersistedEvent::ToolResult {
                tool_name,
                content,
                is_error,
                ..
            } => buffer.push(render_tool_result(tool_name, content, *is_error)),
            PersistedEvent::ToolUse { .. } | PersistedEvent::Other => {}
        }
    }
    flush(&mut buffer, &mut messages);

    if let Some(prompt) = new_prompt
        && is_new_prompt(events, prompt, last_prompt)
    {
        messages.push(Message::user(format_prompt(prompt, ctx)));
    }

    messages
}
