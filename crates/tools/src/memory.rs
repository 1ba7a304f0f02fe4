//! Memory tool: save, search, list, and delete durable notes.

use async_trait::async_trait;
use skiff_core::error::ToolError;
use skiff_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use skiff_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use crate::required_str;

const LIST_LIMIT: usize = 50;

pub struct MemoryTool {
    backend: Arc<dyn MemoryBackend>,
}

impl MemoryTool {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }
}

fn storage_error(e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "Memory".into(),
        reason: e.to_string(),
    }
}

fn format_entries(entries: &[MemoryEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            let tags = if e.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", e.tags.join(", "))
            };
            format!("- ({}) {}{tags}", e.id, e.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "Memory"
    }

    fn description(&self) -> &str {
        "Persistent memory across sessions. Actions: save (content, tags?), search (query), list, delete (id). \
         Save user preferences and project facts worth remembering."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["save", "search", "list", "delete"]
                },
                "content": {
                    "type": "string",
                    "description": "Text to remember (save)"
                },
                "query": {
                    "type": "string",
                    "description": "Search text (search)"
                },
                "id": {
                    "type": "string",
                    "description": "Memory ID (delete)"
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let action = required_str(&arguments, "Memory", "action")?;
        let tags: Vec<String> = arguments
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        match action {
            "save" => {
                let content = required_str(&arguments, "Memory", "content")?;
                let id = self
                    .backend
                    .store(MemoryEntry::new(content, tags))
                    .await
                    .map_err(storage_error)?;
                Ok(ToolResult::ok(format!("Saved memory {id}")))
            }
            "search" => {
                let query = required_str(&arguments, "Memory", "query")?;
                let mut q = MemoryQuery::text(query);
                q.tags = tags;
                let found = self.backend.search(q).await.map_err(storage_error)?;
                if found.is_empty() {
                    Ok(ToolResult::ok(format!("No memories matching '{query}'")))
                } else {
                    Ok(ToolResult::ok(format_entries(&found)))
                }
            }
            "list" => {
                let entries = self.backend.list(LIST_LIMIT).await.map_err(storage_error)?;
                if entries.is_empty() {
                    Ok(ToolResult::ok("No memories saved yet"))
                } else {
                    Ok(ToolResult::ok(format_entries(&entries)))
                }
            }
            "delete" => {
                let id = required_str(&arguments, "Memory", "id")?;
                if self.backend.delete(id).await.map_err(storage_error)? {
                    Ok(ToolResult::ok(format!("Deleted memory {id}")))
                } else {
                    Ok(ToolResult::err(format!("No memory with id {id}")))
                }
            }
            other => Err(ToolError::InvalidArguments(format!(
                "Memory: unknown action '{other}' (expected save, search, list, or delete)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_store::InMemoryBackend;

    fn tool() -> (MemoryTool, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        (MemoryTool::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn save_then_search() {
        let (tool, backend) = tool();
        let saved = tool
            .execute(serde_json::json!({"action": "save", "content": "User prefers 4-space indent", "tags": ["style"]}))
            .await
            .unwrap();
        assert!(saved.to_content().starts_with("Saved memory "));
        assert_eq!(backend.count().await.unwrap(), 1);

        let found = tool
            .execute(serde_json::json!({"action": "search", "query": "indent"}))
            .await
            .unwrap();
        let content = found.to_content();
        assert!(content.contains("User prefers 4-space indent"));
        assert!(content.contains("[style]"));
    }

    #[tokio::test]
    async fn list_and_delete() {
        let (tool, backend) = tool();
        let id = backend.store(MemoryEntry::new("fact", vec![])).await.unwrap();

        let listed = tool.execute(serde_json::json!({"action": "list"})).await.unwrap();
        assert!(listed.to_content().contains(&id));

        let deleted = tool
            .execute(serde_json::json!({"action": "delete", "id": id}))
            .await
            .unwrap();
        assert!(deleted.success);

        let again = tool
            .execute(serde_json::json!({"action": "delete", "id": "missing"}))
            .await
            .unwrap();
        assert!(!again.success);

        let empty = tool.execute(serde_json::json!({"action": "list"})).await.unwrap();
        assert_eq!(empty.to_content(), "No memories saved yet");
    }

    #[tokio::test]
    async fn unknown_action_and_missing_fields() {
        let (tool, _) = tool();
        assert!(matches!(
            tool.execute(serde_json::json!({"action": "forget"})).await,
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            tool.execute(serde_json::json!({"action": "save"})).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
