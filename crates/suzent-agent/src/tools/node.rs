//! Node invocation tool — bridges the agent to connected companion devices.

use std::sync::Arc;

use async_trait::async_trait;

use suzent_nodes::NodeManager;

use super::{Tool, ToolResult};

pub struct NodeInvokeTool {
    nodes: Arc<NodeManager>,
}

impl NodeInvokeTool {
    pub fn new(nodes: Arc<NodeManager>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl Tool for NodeInvokeTool {
    fn name(&self) -> &str {
        "node_invoke"
    }

    fn description(&self) -> &str {
        "Invoke a capability on a connected node (companion device), e.g. \
         camera.snap or speaker.speak. Use node display names or ids."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "node": { "type": "string", "description": "Node id or display name." },
                "command": { "type": "string", "description": "Capability name, e.g. 'camera.snap'." },
                "params": { "type": "object", "description": "Command parameters." }
            },
            "required": ["node", "command"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let node = match input.get("node").and_then(|n| n.as_str()) {
            Some(n) if !n.is_empty() => n,
            _ => {
                let nodes = self.nodes.list();
                if nodes.is_empty() {
                    return ToolResult::error("no nodes connected");
                }
                let listing: Vec<String> = nodes
                    .iter()
                    .map(|n| format!("{} ({})", n.display_name, n.node_id))
                    .collect();
                return ToolResult::error(format!(
                    "missing 'node' parameter. Connected nodes: {}",
                    listing.join(", ")
                ));
            }
        };
        let command = match input.get("command").and_then(|c| c.as_str()) {
            Some(c) if !c.is_empty() => c,
            _ => return ToolResult::error("missing or empty 'command' parameter"),
        };
        let params = input
            .get("params")
            .cloned()
            .unwrap_or(serde_json::Value::Object(Default::default()));

        match self.nodes.invoke(node, command, params).await {
            Ok(outcome) if outcome.success => {
                ToolResult::success(outcome.result.to_string())
            }
            Ok(outcome) => ToolResult::error(
                outcome
                    .error
                    .unwrap_or_else(|| "node reported failure".to_string()),
            ),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
