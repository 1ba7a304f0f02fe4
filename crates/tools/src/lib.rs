//! Built-in tool implementations for skiff.
//!
//! Tools give the agent the ability to act inside its working directory:
//! run shell commands, read/write/edit files, find and search files, look
//! things up on the web, and keep notes in memory.
//!
//! Every filesystem path goes through the session's `WorkspaceGuard`; a path
//! outside the working directory is refused with a security error.

pub mod executor;
pub mod file_edit;
pub mod file_read;
pub mod file_write;
pub mod glob;
pub mod grep;
pub mod memory;
pub mod shell;
pub mod web_search;

use serde_json::Value;
use skiff_config::Settings;
use skiff_core::error::ToolError;
use skiff_core::memory::MemoryBackend;
use skiff_core::tool::ToolRegistry;
use skiff_security::WorkspaceGuard;
use std::path::PathBuf;
use std::sync::Arc;

pub use executor::ToolExecutor;

/// Build the tool registry in schema order.
///
/// The Memory tool is only registered when the memory feature is on and a
/// backend is supplied.
pub fn default_registry(
    guard: Arc<WorkspaceGuard>,
    settings: &Settings,
    memory: Option<Arc<dyn MemoryBackend>>,
) -> ToolRegistry {
    let limits = &settings.tools;
    let tavily = Arc::new(web_search::TavilyClient::from_settings(settings));

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(
        shell::BashTool::new(guard.clone())
            .with_timeout(limits.bash_timeout_secs)
            .with_max_output(limits.max_output_chars)
            .with_blocked_commands(limits.blocked_commands.clone()),
    ));
    registry.register(Box::new(
        file_read::ReadTool::new(guard.clone()).with_max_output(limits.max_output_chars),
    ));
    registry.register(Box::new(file_write::WriteTool::new(guard.clone())));
    registry.register(Box::new(file_edit::EditTool::new(guard.clone())));
    registry.register(Box::new(glob::GlobTool::new(guard.clone())));
    registry.register(Box::new(
        grep::GrepTool::new(guard).with_max_output(limits.max_output_chars),
    ));
    registry.register(Box::new(web_search::WebSearchTool::new(tavily.clone())));
    registry.register(Box::new(web_search::ExtractPageContentTool::new(tavily)));

    if settings.features.memory
        && let Some(backend) = memory
    {
        registry.register(Box::new(memory::MemoryTool::new(backend)));
    }

    registry
}

/// Fetch a required string argument.
pub(crate) fn required_str<'a>(args: &'a Value, tool: &str, key: &str) -> Result<&'a str, ToolError> {
    args.get(key).and_then(Value::as_str).ok_or_else(|| {
        ToolError::InvalidArguments(format!("{tool}: missing required parameter '{key}'"))
    })
}

/// Resolve a path argument inside the working directory.
pub(crate) fn confine(guard: &WorkspaceGuard, tool: &str, path: &str) -> Result<PathBuf, ToolError> {
    guard
        .resolve(tool, path)
        .map_err(|e| ToolError::SecurityViolation(e.to_string()))
}

/// Display form of a resolved path, relative to the working directory when possible.
pub(crate) fn display_path(guard: &WorkspaceGuard, path: &std::path::Path) -> String {
    path.strip_prefix(guard.root())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.display().to_string())
}

/// Cut `text` to at most `max_chars` characters, noting how much was dropped.
pub(crate) fn truncate_output(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => {
            let dropped = text[cut..].chars().count();
            format!("{}\n\n... (output truncated, {dropped} more characters)", &text[..cut])
        }
    }
}
