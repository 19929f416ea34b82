//! Memory tools — auto-equipped when memory is enabled.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use suzent_memory::types::CORE_MEMORY_LABELS;
use suzent_memory::MemoryManager;

use super::{Tool, ToolResult, TurnRuntime};

/// Search the archival memory for facts relevant to a query.
pub struct MemorySearchTool {
    memory: Arc<MemoryManager>,
    user_id: Mutex<String>,
}

impl MemorySearchTool {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self {
            memory,
            user_id: Mutex::new(suzent_core::config::DEFAULT_USER_ID.to_string()),
        }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search long-term memory for facts about the user and past conversations."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look for." },
                "k": { "type": "integer", "description": "Max results (default 5)." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let query = match input.get("query").and_then(|q| q.as_str()) {
            Some(q) if !q.is_empty() => q,
            _ => return ToolResult::error("missing or empty 'query' parameter"),
        };
        let k = input.get("k").and_then(|k| k.as_u64()).unwrap_or(5) as usize;
        let user_id = self.user_id.lock().unwrap().clone();

        match self.memory.search(query, &user_id, k, None).await {
            Ok(hits) if hits.is_empty() => ToolResult::success("No relevant memories found."),
            Ok(hits) => {
                let lines: Vec<String> = hits
                    .iter()
                    .map(|h| {
                        format!(
                            "- [{}] {} (score: {:.2})",
                            h.memory.metadata.category, h.memory.content, h.score
                        )
                    })
                    .collect();
                ToolResult::success(lines.join("\n"))
            }
            Err(e) => ToolResult::error(format!("memory search failed: {e}")),
        }
    }

    fn inject_context(&self, ctx: &TurnRuntime) {
        *self.user_id.lock().unwrap() = ctx.user_id.clone();
    }
}

/// Update one of the user's core memory blocks.
pub struct CoreMemoryUpdateTool {
    memory: Arc<MemoryManager>,
    user_id: Mutex<String>,
}

impl CoreMemoryUpdateTool {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self {
            memory,
            user_id: Mutex::new(suzent_core::config::DEFAULT_USER_ID.to_string()),
        }
    }
}

#[async_trait]
impl Tool for CoreMemoryUpdateTool {
    fn name(&self) -> &str {
        "core_memory_update"
    }

    fn description(&self) -> &str {
        "Replace the content of a core memory block (persona, human, goals, scratchpad)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "label": { "type": "string", "enum": CORE_MEMORY_LABELS },
                "content": { "type": "string" }
            },
            "required": ["label", "content"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let label = match input.get("label").and_then(|l| l.as_str()) {
            Some(l) => l,
            None => return ToolResult::error("missing 'label' parameter"),
        };
        let content = match input.get("content").and_then(|c| c.as_str()) {
            Some(c) => c,
            None => return ToolResult::error("missing 'content' parameter"),
        };
        let user_id = self.user_id.lock().unwrap().clone();

        match self.memory.vector().set_core_block(&user_id, label, content) {
            Ok(()) => ToolResult::success(format!("Core memory block '{label}' updated.")),
            Err(e) => ToolResult::error(format!("core memory update failed: {e}")),
        }
    }

    fn inject_context(&self, ctx: &TurnRuntime) {
        *self.user_id.lock().unwrap() = ctx.user_id.clone();
    }
}
