//! Node abstraction — a companion device (or in-process handler set) that
//! advertises capabilities the agent can invoke.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::proto::InvokeOutcome;

/// Describes a single command a node can handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCapability {
    /// Command name, e.g. "camera.snap".
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Parameter name → type hint ("str", "float", …).
    #[serde(default)]
    pub params_schema: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Connected,
    Disconnected,
}

/// Serialized node info for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub display_name: String,
    pub platform: String,
    pub status: NodeStatus,
    pub connected_at: String,
    pub capabilities: Vec<NodeCapability>,
}

/// Common interface implemented by every node kind.
#[async_trait]
pub trait Node: Send + Sync {
    fn node_id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn platform(&self) -> &str;
    fn status(&self) -> NodeStatus;
    fn connected_at(&self) -> &str;
    fn capabilities(&self) -> &[NodeCapability];

    /// Invoke a command on this node and wait for the outcome.
    async fn invoke(&self, command: &str, params: serde_json::Value) -> Result<InvokeOutcome>;

    /// Liveness check. WebSocket nodes send a ping; local nodes are always up.
    async fn heartbeat(&self) -> bool;

    fn has_capability(&self, command: &str) -> bool {
        self.capabilities().iter().any(|c| c.name == command)
    }

    fn info(&self) -> NodeInfo {
        NodeInfo {
            node_id: self.node_id().to_string(),
            display_name: self.display_name().to_string(),
            platform: self.platform().to_string(),
            status: self.status(),
            connected_at: self.connected_at().to_string(),
            capabilities: self.capabilities().to_vec(),
        }
    }
}
