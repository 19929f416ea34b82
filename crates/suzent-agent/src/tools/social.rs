//! Social message tool — lets the agent push progress updates and files to
//! the platform that drove the current turn.
//!
//! The driver handle and default reply target are captured at turn start
//! via `inject_context`; the tool never discovers them from ambient state.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

use super::{SocialRuntime, Tool, ToolResult, TurnRuntime};

pub struct SocialMessageTool {
    runtime: Mutex<Option<SocialRuntime>>,
}

impl SocialMessageTool {
    pub fn new() -> Self {
        Self {
            runtime: Mutex::new(None),
        }
    }
}

impl Default for SocialMessageTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SocialMessageTool {
    fn name(&self) -> &str {
        "social_message"
    }

    fn description(&self) -> &str {
        "Send an intermediate message (or a file) to the social conversation that \
         triggered this turn. Use for progress updates before the final answer."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "Text to send." },
                "file_path": { "type": "string", "description": "Optional path of a file to attach." },
                "target_id": { "type": "string", "description": "Override the default reply target." }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let runtime = match self.runtime.lock().unwrap().clone() {
            Some(rt) => rt,
            None => {
                return ToolResult::error(
                    "no social context for this turn; this tool only works on platform-driven turns",
                )
            }
        };

        let message = match input.get("message").and_then(|m| m.as_str()) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => return ToolResult::error("missing or empty 'message' parameter"),
        };
        let target = input
            .get("target_id")
            .and_then(|t| t.as_str())
            .unwrap_or(&runtime.default_target)
            .to_string();

        if let Some(path) = input.get("file_path").and_then(|p| p.as_str()) {
            return match runtime
                .sender
                .send_file(&runtime.platform, &target, path, Some(&message))
                .await
            {
                Ok(()) => ToolResult::success(format!("File sent to {} ({target})", runtime.platform)),
                Err(e) => {
                    warn!(platform = %runtime.platform, error = %e, "social file send failed");
                    ToolResult::error(e)
                }
            };
        }

        match runtime
            .sender
            .send_message(&runtime.platform, &target, &message)
            .await
        {
            Ok(()) => ToolResult::success(format!("Message sent to {} ({target})", runtime.platform)),
            Err(e) => {
                warn!(platform = %runtime.platform, error = %e, "social message send failed");
                ToolResult::error(e)
            }
        }
    }

    fn inject_context(&self, ctx: &TurnRuntime) {
        *self.runtime.lock().unwrap() = ctx.social.clone();
    }
}
