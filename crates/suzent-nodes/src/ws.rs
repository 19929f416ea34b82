//! WebSocket-backed node.
//!
//! The socket itself lives in the gateway; this type owns the invocation
//! protocol. Outbound frames go through an mpsc sender into the socket
//! task, responses come back via `handle_frame` and are paired with their
//! pending invocation by `request_id` through oneshot channels.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{NodeError, Result};
use crate::node::{Node, NodeCapability, NodeStatus};
use crate::proto::{ClientFrame, InvokeOutcome, ServerFrame};

/// Default timeout for waiting on node responses.
pub const DEFAULT_INVOKE_TIMEOUT_SECS: u64 = 30;

pub struct WebSocketNode {
    node_id: String,
    display_name: String,
    platform: String,
    connected_at: String,
    capabilities: Vec<NodeCapability>,
    status: AtomicU8, // 0 = connected, 1 = disconnected
    /// Serialized server frames destined for the socket task.
    outbound: mpsc::Sender<String>,
    pending: DashMap<String, oneshot::Sender<InvokeOutcome>>,
    invoke_timeout: Duration,
    /// Guards against double-failure of pending invocations on close.
    closed: Mutex<bool>,
}

impl WebSocketNode {
    pub fn new(
        node_id: String,
        display_name: String,
        platform: String,
        capabilities: Vec<NodeCapability>,
        outbound: mpsc::Sender<String>,
    ) -> Self {
        Self {
            node_id,
            display_name,
            platform,
            connected_at: chrono::Utc::now().to_rfc3339(),
            capabilities,
            status: AtomicU8::new(0),
            outbound,
            pending: DashMap::new(),
            invoke_timeout: Duration::from_secs(DEFAULT_INVOKE_TIMEOUT_SECS),
            closed: Mutex::new(false),
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    /// Process a frame received from the node's socket.
    pub fn handle_frame(&self, frame: ClientFrame) {
        match frame {
            ClientFrame::Result {
                request_id,
                success,
                result,
                error,
            } => match self.pending.remove(&request_id) {
                Some((_, tx)) => {
                    let _ = tx.send(InvokeOutcome {
                        success,
                        result,
                        error,
                    });
                }
                None => {
                    warn!(
                        node = %self.display_name,
                        %request_id,
                        "result for unknown request_id dropped"
                    );
                }
            },
            ClientFrame::Pong => {
                debug!(node = %self.display_name, "heartbeat pong");
            }
            ClientFrame::Event { event, .. } => {
                info!(node = %self.display_name, %event, "node event");
            }
            ClientFrame::Connect { .. } => {
                warn!(node = %self.display_name, "duplicate connect frame ignored");
            }
        }
    }

    /// Mark the node disconnected and fail every pending invocation.
    pub fn close(&self) {
        let mut closed = self.closed.lock().unwrap();
        if *closed {
            return;
        }
        *closed = true;
        self.status.store(1, Ordering::SeqCst);

        let pending_ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in pending_ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(InvokeOutcome {
                    success: false,
                    result: serde_json::Value::Null,
                    error: Some("node connection closing".to_string()),
                });
            }
        }
        info!(node = %self.display_name, "node closed");
    }
}

#[async_trait]
impl Node for WebSocketNode {
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
        if self.status.load(Ordering::SeqCst) == 0 {
            NodeStatus::Connected
        } else {
            NodeStatus::Disconnected
        }
    }

    fn connected_at(&self) -> &str {
        &self.connected_at
    }

    fn capabilities(&self) -> &[NodeCapability] {
        &self.capabilities
    }

    async fn invoke(&self, command: &str, params: serde_json::Value) -> Result<InvokeOutcome> {
        if self.status() != NodeStatus::Connected {
            return Err(NodeError::NotConnected {
                node: self.display_name.clone(),
            });
        }

        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        let frame = ServerFrame::Invoke {
            request_id: request_id.clone(),
            command: command.to_string(),
            params,
        };
        let encoded = serde_json::to_string(&frame)
            .map_err(|e| NodeError::Protocol(e.to_string()))?;

        if self.outbound.send(encoded).await.is_err() {
            self.pending.remove(&request_id);
            self.close();
            return Err(NodeError::Disconnected(format!(
                "node '{}' socket is gone",
                self.display_name
            )));
        }

        match tokio::time::timeout(self.invoke_timeout, rx).await {
            Ok(Ok(outcome)) => {
                // A pending failed by close() arrives as a normal outcome.
                if !outcome.success
                    && outcome.error.as_deref() == Some("node connection closing")
                {
                    return Err(NodeError::Disconnected(format!(
                        "node '{}' disconnected during invoke",
                        self.display_name
                    )));
                }
                Ok(outcome)
            }
            Ok(Err(_)) => Err(NodeError::Disconnected(format!(
                "node '{}' disconnected during invoke",
                self.display_name
            ))),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(NodeError::Timeout {
                    node: self.display_name.clone(),
                    command: command.to_string(),
                    secs: self.invoke_timeout.as_secs(),
                })
            }
        }
    }

    async fn heartbeat(&self) -> bool {
        let encoded = match serde_json::to_string(&ServerFrame::Ping) {
            Ok(e) => e,
            Err(_) => return false,
        };
        if self.outbound.send(encoded).await.is_err() {
            self.close();
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> Vec<NodeCapability> {
        vec![NodeCapability {
            name: "echo.test".to_string(),
            description: "echo".to_string(),
            params_schema: Default::default(),
        }]
    }

    fn node(tx: mpsc::Sender<String>) -> WebSocketNode {
        WebSocketNode::new(
            "n1".to_string(),
            "Phone".to_string(),
            "ios".to_string(),
            caps(),
            tx,
        )
    }

    #[tokio::test]
    async fn invoke_pairs_request_and_response() {
        let (tx, mut rx) = mpsc::channel(8);
        let node = std::sync::Arc::new(node(tx));

        let invoker = std::sync::Arc::clone(&node);
        let handle = tokio::spawn(async move {
            invoker
                .invoke("echo.test", serde_json::json!({"msg": "hi"}))
                .await
        });

        // Read the outbound invoke frame and answer it.
        let raw = rx.recv().await.unwrap();
        let frame: ServerFrame = serde_json::from_str(&raw).unwrap();
        let request_id = match frame {
            ServerFrame::Invoke { request_id, command, params } => {
                assert_eq!(command, "echo.test");
                assert_eq!(params["msg"], "hi");
                request_id
            }
            _ => panic!("expected invoke frame"),
        };
        node.handle_frame(ClientFrame::Result {
            request_id,
            success: true,
            result: serde_json::json!({"echo": "hi"}),
            error: None,
        });

        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.result["echo"], "hi");
    }

    #[tokio::test]
    async fn invoke_times_out() {
        let (tx, _rx) = mpsc::channel(8);
        let node = WebSocketNode::new(
            "n1".to_string(),
            "Phone".to_string(),
            "ios".to_string(),
            caps(),
            tx,
        )
        .with_timeout(Duration::from_millis(20));

        let err = node
            .invoke("echo.test", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Timeout { .. }));
        assert!(node.pending.is_empty());
    }

    #[tokio::test]
    async fn close_fails_pending_invocations() {
        let (tx, mut rx) = mpsc::channel(8);
        let node = std::sync::Arc::new(node(tx));

        let invoker = std::sync::Arc::clone(&node);
        let handle =
            tokio::spawn(async move { invoker.invoke("echo.test", serde_json::Value::Null).await });

        let _ = rx.recv().await.unwrap();
        node.close();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, NodeError::Disconnected(_)));
        assert_eq!(node.status(), NodeStatus::Disconnected);
    }

    #[tokio::test]
    async fn unknown_request_id_is_dropped() {
        let (tx, _rx) = mpsc::channel(8);
        let node = node(tx);
        // Must not panic or leave state behind.
        node.handle_frame(ClientFrame::Result {
            request_id: "nope".to_string(),
            success: true,
            result: serde_json::Value::Null,
            error: None,
        });
        assert!(node.pending.is_empty());
    }
}
