//! Node routes: REST listing/invocation plus the `/ws/node` gateway.
//!
//! Handshake: the first frame on the socket must be `{"type":"connect",…}`;
//! the server assigns a node id and replies `{"type":"connected",…}`.
//! Anything else gets `{"type":"error",…}` and a close. After the
//! handshake the connection task pumps outbound invoke frames from the
//! node's mpsc queue and routes inbound frames to the node for
//! request/response pairing.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use suzent_nodes::{ClientFrame, Node, NodeError, ServerFrame, WebSocketNode};

use crate::app::AppState;
use crate::http::{ApiError, ApiResult};

/// Close the socket when the handshake doesn't complete in time.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Outbound frame queue per node.
const OUTBOUND_CAPACITY: usize = 32;

pub async fn list_nodes(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let nodes = state.nodes.list();
    Json(serde_json::json!({ "count": nodes.len(), "nodes": nodes }))
}

pub async fn describe_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    match state.nodes.get(&id) {
        Some(node) => Ok(Json(serde_json::to_value(node.info())?)),
        None => Err(ApiError(suzent_core::SuzentError::NotFound(format!(
            "node {id}"
        )))),
    }
}

#[derive(Deserialize)]
pub struct InvokeBody {
    pub command: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// POST /nodes/{id}/invoke
pub async fn invoke_node(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<InvokeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.command.trim().is_empty() {
        return Err(ApiError(suzent_core::SuzentError::invalid_input(
            "command",
            "command is required",
        )));
    }
    let outcome = state
        .nodes
        .invoke(&id, &body.command, body.params)
        .await
        .map_err(node_error)?;
    Ok(Json(serde_json::to_value(outcome)?))
}

fn node_error(e: NodeError) -> ApiError {
    ApiError(e.into())
}

/// GET /ws/node — upgrade to the node gateway protocol.
pub async fn node_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_node_connection(socket, state))
}

async fn handle_node_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut tx, mut rx) = socket.split();

    // Handshake: first frame must be `connect`.
    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, rx.next()).await;
    let connect = match first {
        Ok(Some(Ok(Message::Text(text)))) => {
            match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Connect {
                    display_name,
                    platform,
                    capabilities,
                }) => Some((display_name, platform, capabilities)),
                Ok(_) | Err(_) => None,
            }
        }
        _ => None,
    };

    let Some((display_name, platform, capabilities)) = connect else {
        warn!("node handshake failed, closing socket");
        let err = ServerFrame::Error {
            message: "Expected 'connect' message".to_string(),
        };
        if let Ok(encoded) = serde_json::to_string(&err) {
            let _ = tx.send(Message::Text(encoded.into())).await;
        }
        let _ = tx.close().await;
        return;
    };

    let node_id = Uuid::new_v4().to_string();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let node = Arc::new(WebSocketNode::new(
        node_id.clone(),
        display_name.clone(),
        platform.clone(),
        capabilities,
        outbound_tx,
    ));
    state.nodes.register(Arc::clone(&node) as Arc<dyn Node>);

    let ack = ServerFrame::Connected {
        node_id: node_id.clone(),
    };
    if let Ok(encoded) = serde_json::to_string(&ack) {
        if tx.send(Message::Text(encoded.into())).await.is_err() {
            node.close();
            state.nodes.unregister(&node_id);
            return;
        }
    }

    info!(node_id = %node_id, name = %display_name, %platform, "node connected");

    // Connection task: pump outbound frames, route inbound frames.
    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if tx.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame) => node.handle_frame(frame),
                            Err(e) => warn!(node_id = %node_id, error = %e, "malformed node frame dropped"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(node_id = %node_id, error = %e, "node socket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    node.close();
    state.nodes.unregister(&node_id);
    info!(node_id = %node_id, name = %display_name, "node disconnected");
}
