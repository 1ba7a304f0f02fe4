//! Read tool: file contents with line numbers.

use async_trait::async_trait;
use skiff_core::error::ToolError;
use skiff_core::tool::{Tool, ToolResult};
use skiff_security::WorkspaceGuard;
use std::sync::Arc;
use crate::{confine, display_path, required_str, truncate_output};

pub const DEFAULT_LINE_LIMIT: usize = 2000;

pub struct ReadTool {
    guard: Arc<WorkspaceGuard>,
    max_output_chars: usize,
}

impl ReadTool {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self {
            guard,
            max_output_chars: 30_000,
        }
    }

    pub fn with_max_output(mut self, chars: usize) -> Self {
        self.max_output_chars = chars;
        self
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "Read"
    }

    fn description(&self) -> &str {
        "Read a file from the working directory. Returns numbered lines. \
         Use offset and limit to page through large files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the working directory"
                },
                "offset": {
                    "type": "integer",
                    "description": "1-based line number to start reading from"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default 2000)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "Read", "path")?;
        let resolved = confine(&self.guard, "Read", path)?;

        let offset = arguments
            .get("offset")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
            .max(1) as usize;
        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LINE_LIMIT);

        if resolved.is_dir() {
            return Err(ToolError::ExecutionFailed {
                tool_name: "Read".into(),
                reason: format!("'{path}' is a directory; use Glob to list files"),
            });
        }

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "Read".into(),
                reason: format!("Failed to read '{}': {e}", display_path(&self.guard, &resolved)),
            })?;

        if content.is_empty() {
            return Ok(ToolResult::ok("(empty file)"));
        }

        let total = content.lines().count();
        let mut out = String::new();
        for (n, line) in content.lines().enumerate().skip(offset - 1).take(limit) {
            out.push_str(&format!("{:>6}\t{line}\n", n + 1));
        }

        if out.is_empty() {
            return Ok(ToolResult::ok(format!(
                "(offset {offset} is past the end of the file; it has {total} lines)"
            )));
        }

        let shown_to = (offset - 1 + limit).min(total);
        if shown_to < total {
            out.push_str(&format!("... ({} more lines)\n", total - shown_to));
        }

        Ok(ToolResult::ok(truncate_output(out.trim_end(), self.max_output_chars)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(dir: &std::path::Path) -> ReadTool {
        ReadTool::new(Arc::new(WorkspaceGuard::new(dir)))
    }

    #[tokio::test]
    async fn reads_numbered_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\nbeta\n").unwrap();

        let result = tool(dir.path())
            .execute(serde_json::json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert_eq!(result.to_content(), "     1\talpha\n     2\tbeta");
    }

    #[tokio::test]
    async fn offset_and_limit_page_through() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (1..=10).map(|i| format!("line {i}\n")).collect();
        std::fs::write(dir.path().join("big.txt"), body).unwrap();

        let result = tool(dir.path())
            .execute(serde_json::json!({"path": "big.txt", "offset": 3, "limit": 2}))
            .await
            .unwrap();
        let content = result.to_content();
        assert!(content.starts_with("     3\tline 3\n     4\tline 4"));
        assert!(content.ends_with("... (6 more lines)"));
    }

    #[tokio::test]
    async fn refuses_path_outside_working_directory() {
        let result = ReadTool::new(Arc::new(WorkspaceGuard::new("/home/user/project")))
            .execute(serde_json::json!({"path": "../../etc/passwd"}))
            .await;
        match result {
            Err(ToolError::SecurityViolation(msg)) => assert!(msg.contains("outside working directory")),
            other => panic!("expected security violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_execution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool(dir.path())
            .execute(serde_json::json!({"path": "nope.txt"}))
            .await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let result = tool(dir.path())
            .execute(serde_json::json!({"path": "src"}))
            .await;
        assert!(result.is_err());
    }
}
