//! Write tool: create or overwrite a file.

use async_trait::async_trait;
use skiff_core::error::ToolError;
use skiff_core::tool::{Tool, ToolResult};
use skiff_security::WorkspaceGuard;
use std::sync::Arc;
use crate::{confine, display_path, required_str};

pub struct WriteTool {
    guard: Arc<WorkspaceGuard>,
}

impl WriteTool {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "Write"
    }

    fn description(&self) -> &str {
        "Write content to a file in the working directory, replacing it if it exists. Parent directories are created as needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the working directory"
                },
                "content": {
                    "type": "string",
                    "description": "The full file content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "Write", "path")?;
        let content = required_str(&arguments, "Write", "content")?;
        let resolved = confine(&self.guard, "Write", path)?;

        let fail = |reason: String| ToolError::ExecutionFailed {
            tool_name: "Write".into(),
            reason,
        };

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fail(format!("Failed to create directories: {e}")))?;
        }

        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| fail(format!("Failed to write file: {e}")))?;

        Ok(ToolResult::ok(format!(
            "Wrote {} bytes to {}",
            content.len(),
            display_path(&self.guard, &resolved)
        )))
    }
}
