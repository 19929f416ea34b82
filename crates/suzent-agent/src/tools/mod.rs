//! Tool system for the agent loop.
//!
//! Tools are shared (`Arc<dyn Tool>`) between the cached agent and its
//! per-turn clones, so stateful tools keep their runtime handles behind
//! interior mutability and receive them through [`Tool::inject_context`]
//! right before each run — never from ambient state.

pub mod memory;
pub mod node;
pub mod planning;
pub mod skill;
pub mod social;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::ToolDefinition;

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text content returned to the LLM.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// Handle to the platform driver a social reply should go through.
///
/// Implemented by the channel manager; captured at turn start and handed to
/// the social message tool explicitly.
#[async_trait]
pub trait SocialSender: Send + Sync {
    async fn send_message(
        &self,
        platform: &str,
        target_id: &str,
        content: &str,
    ) -> Result<(), String>;

    async fn send_file(
        &self,
        platform: &str,
        target_id: &str,
        path: &str,
        caption: Option<&str>,
    ) -> Result<(), String>;
}

/// Per-turn runtime handles injected into stateful tools.
#[derive(Clone, Default)]
pub struct TurnRuntime {
    pub chat_id: String,
    pub user_id: String,
    /// Platform driver handle plus the default reply target, present only
    /// on platform-driven turns.
    pub social: Option<SocialRuntime>,
}

#[derive(Clone)]
pub struct SocialRuntime {
    pub sender: Arc<dyn SocialSender>,
    pub platform: String,
    pub default_target: String,
}

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name for this tool (e.g. "memory_search").
    fn name(&self) -> &str;
    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;
    /// Execute the tool with the given input.
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
    /// Receive the current turn's runtime handles. Stateless tools ignore it.
    fn inject_context(&self, _ctx: &TurnRuntime) {}
}

/// Convert a slice of tools to API-level tool definitions.
pub fn to_definitions(tools: &[Arc<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}
