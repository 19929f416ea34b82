use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::app::AppState;

/// GET /health — liveness plus subsystem flags.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "memory_enabled": state.memory.is_some(),
        "scheduler_running": state.scheduler().is_some(),
        "active_streams": state.streams.active_count(),
        "connected_nodes": state.nodes.connected_count(),
    }))
}
