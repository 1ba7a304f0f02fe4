//! Edit tool: exact string replacement inside a file.
//!
//! The match must be unique unless `replace_all` is set, so an edit never
//! lands somewhere the model did not intend.

use async_trait::async_trait;
use skiff_core::error::ToolError;
use skiff_core::tool::{Tool, ToolResult};
use skiff_security::WorkspaceGuard;
use std::sync::Arc;
use crate::{confine, display_path, required_str};

pub struct EditTool {
    guard: Arc<WorkspaceGuard>,
}

impl EditTool {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self { guard }
    }
}

/// Apply the replacement to `content`, returning the new text and the number of replacements.
fn apply_edit(content: &str, old: &str, new: &str, replace_all: bool) -> Result<(String, usize), String> {
    if old.is_empty() {
        return Err("old_string must not be empty".into());
    }
    if old == new {
        return Err("old_string and new_string are identical".into());
    }

    match content.matches(old).count() {
        0 => Err("old_string not found in file".into()),
        1 => Ok((content.replacen(old, new, 1), 1)),
        n if replace_all => Ok((content.replace(old, new), n)),
        n => Err(format!(
            "old_string appears {n} times in the file; add surrounding context to make it unique or set replace_all"
        )),
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "Edit"
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file. old_string must match exactly once unless replace_all is true."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the working directory"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence (default false)"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "Edit", "path")?;
        let old = required_str(&arguments, "Edit", "old_string")?;
        let new = required_str(&arguments, "Edit", "new_string")?;
        let replace_all = arguments
            .get("replace_all")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let resolved = confine(&self.guard, "Edit", path)?;
        let shown = display_path(&self.guard, &resolved);

        let fail = |reason: String| ToolError::ExecutionFailed {
            tool_name: "Edit".into(),
            reason,
        };

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| fail(format!("Failed to read '{shown}': {e}")))?;

        let (updated, count) = apply_edit(&content, old, new, replace_all).map_err(fail)?;

        tokio::fs::write(&resolved, updated)
            .await
            .map_err(|e| fail(format!("Failed to write '{shown}': {e}")))?;

        let noun = if count == 1 { "occurrence" } else { "occurrences" };
        Ok(ToolResult::ok(format!("Replaced {count} {noun} in {shown}")))
    }
}
