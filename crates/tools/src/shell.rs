//! Bash tool: execute shell commands in the working directory.
//!
//! Supports a substring deny-list, per-call timeouts, and output truncation.

use async_trait::async_trait;
use skiff_core::error::ToolError;
use skiff_core::tool::{Tool, ToolResult};
use skiff_security::{AuditEvent, WorkspaceGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use crate::{required_str, truncate_output};

/// Upper bound for a caller-supplied timeout.
pub const MAX_TIMEOUT_SECS: u64 = 600;

pub struct BashTool {
    guard: Arc<WorkspaceGuard>,
    timeout_secs: u64,
    max_output_chars: usize,
    blocked_commands: Vec<String>,
}

impl BashTool {
    pub fn new(guard: Arc<WorkspaceGuard>) -> Self {
        Self {
            guard,
            timeout_secs: 120,
            max_output_chars: 30_000,
            blocked_commands: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.clamp(1, MAX_TIMEOUT_SECS);
        self
    }

    pub fn with_max_output(mut self, chars: usize) -> Self {
        self.max_output_chars = chars;
        self
    }

    pub fn with_blocked_commands(mut self, blocked: Vec<String>) -> Self {
        self.blocked_commands = blocked;
        self
    }

    fn blocked_by(&self, command: &str) -> Option<&str> {
        self.blocked_commands
            .iter()
            .find(|b| !b.is_empty() && command.contains(b.as_str()))
            .map(String::as_str)
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "Bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the working directory and return its combined stdout/stderr. \
         Use this for running programs, builds, tests, and git operations. A non-zero exit code is reported as an error."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (max 600)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = required_str(&arguments, "Bash", "command")?;

        if let Some(pattern) = self.blocked_by(command) {
            warn!(command = %command, pattern = %pattern, "Blocked shell command");
            if let Some(audit) = self.guard.audit() {
                audit.log(
                    AuditEvent::CommandDenied { command: command.into() },
                    "Bash",
                    Some(format!("matched '{pattern}'")),
                );
            }
            return Err(ToolError::SecurityViolation(format!(
                "Command blocked: contains '{pattern}'"
            )));
        }

        let timeout_secs = arguments
            .get("timeout")
            .and_then(|v| v.as_u64())
            .map(|t| t.clamp(1, MAX_TIMEOUT_SECS))
            .unwrap_or(self.timeout_secs);

        debug!(command = %command, timeout_secs, cwd = %self.guard.root().display(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(self.guard.root())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "Bash".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool_name: "Bash".into(),
                    timeout_secs,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut combined = stdout.trim_end().to_string();
        if !stderr.trim().is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(stderr.trim_end());
        }
        let combined = truncate_output(&combined, self.max_output_chars);

        if output.status.success() {
            if combined.is_empty() {
                Ok(ToolResult::empty())
            } else {
                Ok(ToolResult::ok(combined))
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            Ok(ToolResult::err(format!("Exit code {code}\n{combined}").trim_end().to_string()))
        }
    }
}
