use serde::{Deserialize, Serialize};
use suzent_core::types::ChatMessage;

/// A persisted conversation context.
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub config: serde_json::Value,
    pub messages: Vec<ChatMessage>,
    /// Serialized agent state. Never sent to API clients.
    #[serde(skip_serializing)]
    pub agent_state: Option<Vec<u8>>,
    pub created_at: String,
    pub updated_at: String,
}

/// Listing/search row — no message bodies, no agent state.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial update applied atomically by [`ChatStore::update`](crate::store::ChatStore::update).
///
/// `None` fields are left untouched. Messages and agent state are committed
/// in the same statement so a turn's log and state never diverge.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ChatUpdate {
    pub title: Option<String>,
    pub config: Option<serde_json::Value>,
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(skip_deserializing)]
    pub agent_state: Option<Vec<u8>>,
}

/// Persisted per-user defaults merged into every turn's config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    pub model: Option<String>,
    pub agent: Option<String>,
    pub tools: Option<Vec<String>>,
}

/// A registered MCP endpoint (URL or stdio).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServer {
    pub name: String,
    /// "http" or "stdio".
    pub transport: String,
    pub url: Option<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub enabled: bool,
}

/// One versioned plan snapshot for a chat.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: i64,
    pub chat_id: String,
    pub version: i64,
    pub content: String,
    pub created_at: String,
}
