//! Grep tool: regex search over files, respecting `.gitignore`.

use async_trait::async_trait;
use skiff_core::error::ToolError;
use skiff_core::tool::{Tool, ToolResult};
use skiff_security::WorkspaceGuard;
use std::path::Path;
use std::sync::Arc;
use crate::{confine, display_path, required_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    FilesWithMatches,
    Content,
    Count,
}

impl OutputMode {
    fn parse(s: Option<&str>) -> Result<Self, ToolError> {
        match s.unwrap_or("files_with_matches") {
            "files_with_matches" => Ok(Self::FilesWithMatches),
            "content" => Ok(Self::Content),
            "count" => Ok(Self::Count),
            other => Err(ToolError::InvalidArguments(format!(
                "Grep: unknown output_mode '{other}' (expected files_with_matches, content, or count)"
            ))),
        }
    }
}

pub struct GrepTool {
    guard: Arc<WorkspaceGuard>,
    max_output_chars: usize,
}

impl GrepTool {
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

    /// Append this file's matches to `out`. Unreadable and binary files are skipped.
    fn grep_file(&self, path: &Path, regex: &regex::Regex, mode: OutputMode, out: &mut Vec<String>) {
        let Ok(content) = std::fs::read_to_string(path) else {
            return;
        };
        let shown = display_path(&self.guard, path);

        match mode {
            OutputMode::FilesWithMatches => {
                if content.lines().any(|l| regex.is_match(l)) {
                    out.push(shown);
                }
            }
            OutputMode::Count => {
                let n = content.lines().filter(|l| regex.is_match(l)).count();
                if n > 0 {
                    out.push(format!("{shown}:{n}"));
                }
            }
            OutputMode::Content => {
                for (i, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        out.push(format!("{shown}:{}:{line}", i + 1));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "Grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression. Honors .gitignore. \
         output_mode: files_with_matches (default), content (file:line:text), or count."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search (default: the working directory)"
                },
                "glob": {
                    "type": "string",
                    "description": "Only search files matching this glob (e.g. \"*.rs\")"
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Case-insensitive matching (default false)"
                },
                "output_mode": {
                    "type": "string",
                    "enum": ["files_with_matches", "content", "count"]
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let pattern = required_str(&arguments, "Grep", "pattern")?;
        let search_path = match arguments.get("path").and_then(|v| v.as_str()) {
            Some(path) => confine(&self.guard, "Grep", path)?,
            None => self.guard.root().to_path_buf(),
        };
        let case_insensitive = arguments
            .get("case_insensitive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let mode = OutputMode::parse(arguments.get("output_mode").and_then(|v| v.as_str()))?;

        if !search_path.exists() {
            return Err(ToolError::ExecutionFailed {
                tool_name: "Grep".into(),
                reason: format!("Path not found: {}", display_path(&self.guard, &search_path)),
            });
        }

        let regex = regex::RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid regex pattern: {e}")))?;

        let file_filter = match arguments.get("glob").and_then(|v| v.as_str()) {
            Some(g) => Some(
                ignore::overrides::OverrideBuilder::new(&search_path)
                    .add(g)
                    .and_then(|b| b.build())
                    .map_err(|e| ToolError::InvalidArguments(format!("Invalid glob filter: {e}")))?,
            ),
            None => None,
        };

        let mut results = Vec::new();
        if search_path.is_file() {
            self.grep_file(&search_path, &regex, mode, &mut results);
        } else {
            let walker = ignore::WalkBuilder::new(&search_path)
                .hidden(true)
                .git_ignore(true)
                .git_global(true)
                .git_exclude(true)
                .require_git(false)
                .sort_by_file_path(|a, b| a.cmp(b))
                .build();

            let mut budget = 0usize;
            for entry in walker.flatten() {
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    continue;
                }
                let path = entry.path();

                if let Some(overrides) = &file_filter
                    && !overrides.matched(path, false).is_whitelist()
                {
                    continue;
                }

                let before = results.len();
                self.grep_file(path, &regex, mode, &mut results);
                budget += results[before..].iter().map(|l| l.len() + 1).sum::<usize>();
                if budget >= self.max_output_chars {
                    break;
                }
            }
        }

        if results.is_empty() {
            return Ok(ToolResult::ok("No matches found"));
        }

        Ok(ToolResult::ok(crate::truncate_output(
            &results.join("\n"),
            self.max_output_chars,
        )))
    }
}
