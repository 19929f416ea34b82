//! In-process node — exposes host capabilities without a socket.
//!
//! Handlers are plain async closures registered by name; the same
//! capability model as WebSocket nodes, so the agent's node tool treats
//! both identically.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;
use uuid::Uuid;

use crate::error::Result;
use crate::node::{Node, NodeCapability, NodeStatus};
use crate::proto::InvokeOutcome;

type HandlerFuture = Pin<Box<dyn Future<Output = std::result::Result<serde_json::Value, String>> + Send>>;
type Handler = Arc<dyn Fn(serde_json::Value) -> HandlerFuture + Send + Sync>;

pub struct LocalNode {
    node_id: String,
    display_name: String,
    platform: String,
    connected_at: String,
    capabilities: Vec<NodeCapability>,
    handlers: HashMap<String, Handler>,
}

impl LocalNode {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            node_id: format!("local-{}", &Uuid::new_v4().to_string()[..8]),
            display_name: display_name.into(),
            platform: std::env::consts::OS.to_string(),
            connected_at: chrono::Utc::now().to_rfc3339(),
            capabilities: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register a capability with its handler.
    pub fn register<F, Fut>(mut self, capability: NodeCapability, handler: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<serde_json::Value, String>> + Send + 'static,
    {
        let name = capability.name.clone();
        self.capabilities.push(capability);
        self.handlers
            .insert(name, Arc::new(move |params| Box::pin(handler(params))));
        self
    }
}

#[async_trait]
impl Node for LocalNode {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn platform(&self) -> &str {
        &self.platform
    }

    fn status(&self) -> NodeStatus {
        NodeStatus::Connected
    }

    fn connected_at(&self) -> &str {
        &self.connected_at
    }

    fn capabilities(&self) -> &[NodeCapability] {
        &self.capabilities
    }

    async fn invoke(&self, command: &str, params: serde_json::Value) -> Result<InvokeOutcome> {
        let Some(handler) = self.handlers.get(command) else {
            return Ok(InvokeOutcome {
                success: false,
                result: serde_json::Value::Null,
                error: Some(format!("Unknown command: {command}")),
            });
        };
        match handler(params).await {
            Ok(result) => Ok(InvokeOutcome {
                success: true,
                result,
                error: None,
            }),
            Err(e) => {
                error!(command, error = %e, "local node handler failed");
                Ok(InvokeOutcome {
                    success: false,
                    result: serde_json::Value::Null,
                    error: Some(e),
                })
            }
        }
    }

    async fn heartbeat(&self) -> bool {
        true
    }
}
