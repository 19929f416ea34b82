//! Planning tool — persists versioned plan snapshots for the current chat.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use suzent_chats::ChatStore;

use super::{Tool, ToolResult, TurnRuntime};

pub struct PlanningTool {
    chats: Arc<ChatStore>,
    chat_id: Mutex<String>,
}

impl PlanningTool {
    pub fn new(chats: Arc<ChatStore>) -> Self {
        Self {
            chats,
            chat_id: Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl Tool for PlanningTool {
    fn name(&self) -> &str {
        "planning"
    }

    fn description(&self) -> &str {
        "Write or update the working plan for this conversation. \
         Each call stores a new plan version; the latest version is shown to the user."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Full plan text in markdown." }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let content = match input.get("content").and_then(|c| c.as_str()) {
            Some(c) if !c.trim().is_empty() => c,
            _ => return ToolResult::error("missing or empty 'content' parameter"),
        };
        let chat_id = self.chat_id.lock().unwrap().clone();
        if chat_id.is_empty() {
            return ToolResult::error("no chat bound to this turn");
        }

        match self.chats.save_plan(&chat_id, content) {
            Ok(plan) => ToolResult::success(format!("Plan saved (version {}).", plan.version)),
            Err(e) => ToolResult::error(format!("failed to save plan: {e}")),
        }
    }

    fn inject_context(&self, ctx: &TurnRuntime) {
        *self.chat_id.lock().unwrap() = ctx.chat_id.clone();
    }
}
