//! Registry of connected nodes with capability-checked dispatch.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::error::{NodeError, Result};
use crate::node::{Node, NodeInfo, NodeStatus};
use crate::proto::InvokeOutcome;

#[derive(Default)]
pub struct NodeManager {
    nodes: DashMap<String, Arc<dyn Node>>,
}

impl NodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node: Arc<dyn Node>) {
        info!(
            node_id = %node.node_id(),
            name = %node.display_name(),
            capabilities = node.capabilities().len(),
            "node registered"
        );
        self.nodes.insert(node.node_id().to_string(), node);
    }

    /// Remove a node. Returns false when the id was unknown.
    pub fn unregister(&self, node_id: &str) -> bool {
        match self.nodes.remove(node_id) {
            Some((_, node)) => {
                info!(node_id, name = %node.display_name(), "node unregistered");
                true
            }
            None => {
                warn!(node_id, "unregister of unknown node");
                false
            }
        }
    }

    /// Lookup by node id, falling back to a case-insensitive display name match.
    pub fn get(&self, id_or_name: &str) -> Option<Arc<dyn Node>> {
        if let Some(node) = self.nodes.get(id_or_name) {
            return Some(Arc::clone(node.value()));
        }
        let lower = id_or_name.to_lowercase();
        self.nodes
            .iter()
            .find(|entry| entry.value().display_name().to_lowercase() == lower)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn list(&self) -> Vec<NodeInfo> {
        let mut infos: Vec<NodeInfo> = self.nodes.iter().map(|e| e.value().info()).collect();
        infos.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        infos
    }

    pub fn connected_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|e| e.value().status() == NodeStatus::Connected)
            .count()
    }

    /// Dispatch a command to a node after checking it is connected and
    /// advertises the capability.
    pub async fn invoke(
        &self,
        id_or_name: &str,
        command: &str,
        params: serde_json::Value,
    ) -> Result<InvokeOutcome> {
        let node = self
            .get(id_or_name)
            .ok_or_else(|| NodeError::NotFound(id_or_name.to_string()))?;

        if node.status() != NodeStatus::Connected {
            return Err(NodeError::NotConnected {
                node: node.display_name().to_string(),
            });
        }
        if !node.has_capability(command) {
            let available = node
                .capabilities()
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(NodeError::UnsupportedCommand {
                node: node.display_name().to_string(),
                command: command.to_string(),
                available,
            });
        }

        info!(command, node = %node.display_name(), "invoking node command");
        node.invoke(command, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalNode;
    use crate::node::NodeCapability;

    fn echo_node() -> Arc<dyn Node> {
        Arc::new(LocalNode::new("Local PC").register(
            NodeCapability {
                name: "echo.test".to_string(),
                description: String::new(),
                params_schema: Default::default(),
            },
            |params| async move { Ok(params) },
        ))
    }

    #[tokio::test]
    async fn register_invoke_unregister() {
        let mgr = NodeManager::new();
        let node = echo_node();
        let id = node.node_id().to_string();
        mgr.register(node);

        assert_eq!(mgr.list().len(), 1);
        assert_eq!(mgr.connected_count(), 1);

        let outcome = mgr
            .invoke(&id, "echo.test", serde_json::json!({"a": 1}))
            .await
            .unwrap();
        assert!(outcome.success);

        assert!(mgr.unregister(&id));
        assert!(!mgr.unregister(&id));
        assert!(mgr.list().is_empty());
    }

    #[tokio::test]
    async fn lookup_by_display_name() {
        let mgr = NodeManager::new();
        mgr.register(echo_node());
        assert!(mgr.get("local pc").is_some());
        assert!(mgr.get("unknown").is_none());
    }

    #[tokio::test]
    async fn unsupported_command_lists_available() {
        let mgr = NodeManager::new();
        mgr.register(echo_node());

        let err = mgr
            .invoke("Local PC", "missing.cmd", serde_json::Value::Null)
            .await
            .unwrap_err();
        match err {
            NodeError::UnsupportedCommand { available, .. } => {
                assert!(available.contains("echo.test"));
            }
            other => panic!("expected UnsupportedCommand, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_node_is_not_found() {
        let mgr = NodeManager::new();
        let err = mgr
            .invoke("ghost", "x", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::NotFound(_)));
    }
}
