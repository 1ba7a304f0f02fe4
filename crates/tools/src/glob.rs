//! Glob tool: find files by pattern, newest first.

use async_trait::async_trait;
use skiff_core::error::ToolError;
use skiff_core::tool::{Tool, ToolResult};
use skiff_security::WorkspaceGuard;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use crate::{confine, display_path, required_str};

const MAX_RESULTS: usize = 1000;

pub struct GlobTool {
    guard: Arc<WorkspaceGuard>,
}

impl GlobTool {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "Glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g. \"src/**/*.rs\"). Returns paths relative to the working directory, most recently modified first."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to match"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search in (default: the working directory)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let pattern = required_str(&arguments, "Glob", "pattern")?;
        let base = match arguments.get("path").and_then(|v| v.as_str()) {
            Some(path) => confine(&self.guard, "Glob", path)?,
            None => self.guard.root().to_path_buf(),
        };

        // The joined pattern is confined too, so `../*` or an absolute pattern cannot widen the search
        let joined = base.join(pattern);
        let full_pattern = confine(&self.guard, "Glob", &joined.to_string_lossy())?;

        let paths = ::glob::glob(&full_pattern.to_string_lossy())
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid glob pattern: {e}")))?;

        let mut matches: Vec<(PathBuf, SystemTime)> = paths
            .filter_map(Result::ok)
            // Canonical check: `**` follows symlinked directories
            .filter(|p| p.is_file() && self.guard.resolve("Glob", &p.to_string_lossy()).is_ok())
            .map(|p| {
                let modified = p
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (p, modified)
            })
            .collect();

        if matches.is_empty() {
            return Ok(ToolResult::ok("No files matched the pattern"));
        }

        // Newest first; ties broken by path for stable output
        matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let total = matches.len();
        let mut lines: Vec<String> = matches
            .iter()
            .take(MAX_RESULTS)
            .map(|(p, _)| display_path(&self.guard, p))
            .collect();
        if total > MAX_RESULTS {
            lines.push(format!("... ({} more files)", total - MAX_RESULTS));
        }

        Ok(ToolResult::ok(lines.join("\n")))
    }
}
