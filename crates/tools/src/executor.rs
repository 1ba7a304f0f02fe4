//! The tool executor: the single entry point the agent loop uses to act.
//!
//! `execute_tool` never fails. Unknown tools, malformed arguments, security
//! refusals, and tool errors all come back as a failed `ToolResult` whose
//! text is fed to the model.

use serde_json::Value;
use skiff_config::Settings;
use skiff_core::error::ToolError;
use skiff_core::memory::MemoryBackend;
use skiff_core::provider::ToolDefinition;
use skiff_core::tool::{ToolCall, ToolRegistry, ToolResult};
use skiff_security::{AuditLogger, WorkspaceGuard};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ToolExecutor {
    registry: ToolRegistry,
    guard: Arc<WorkspaceGuard>,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, guard: Arc<WorkspaceGuard>) -> Self {
        Self { registry, guard }
    }

    /// The standard tool set confined to `working_dir`, with blocked
    /// accesses written to the audit log.
    pub fn from_settings(
        working_dir: impl Into<PathBuf>,
        settings: &Settings,
        memory: Option<Arc<dyn MemoryBackend>>,
    ) -> Self {
        let guard = Arc::new(
            WorkspaceGuard::new(working_dir).with_audit(Arc::new(AuditLogger::default())),
        );
        let registry = crate::default_registry(guard.clone(), settings, memory);
        Self::new(registry, guard)
    }

    pub fn working_dir(&self) -> &Path {
        self.guard.root()
    }

    pub fn is_path_safe(&self, path: &str) -> bool {
        self.guard.is_path_safe(path)
    }

    pub fn audit(&self) -> Option<&Arc<AuditLogger>> {
        self.guard.audit()
    }

    /// Tool schema in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.names().into_iter().map(str::to_string).collect()
    }

    /// Run a tool from its raw JSON argument string.
    pub async fn execute_tool(&self, name: &str, arguments: &str) -> ToolResult {
        if self.registry.get(name).is_none() {
            warn!(tool = %name, "Model requested unknown tool");
            return ToolError::NotFound(name.to_string()).into();
        }

        let parsed = if arguments.trim().is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            serde_json::from_str::<Value>(arguments)
        };

        match parsed {
            Ok(value) => self.execute_value(name, value).await,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool arguments are not valid JSON");
                ToolResult::err(format!("Failed to parse arguments for {name}: {e}"))
            }
        }
    }

    /// Run a tool with already-parsed arguments.
    pub async fn execute_value(&self, name: &str, arguments: Value) -> ToolResult {
        if !arguments.is_object() {
            return ToolError::InvalidArguments(format!("{name}: arguments must be a JSON object")).into();
        }

        let call = ToolCall {
            id: String::new(),
            name: name.to_string(),
            arguments,
        };

        match self.registry.execute(&call).await {
            Ok(result) => {
                debug!(tool = %name, success = result.success, "Tool finished");
                result
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool failed");
                e.into()
            }
        }
    }
}
