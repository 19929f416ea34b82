//! Heartbeat control routes.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use suzent_core::SuzentError;
use suzent_scheduler::HeartbeatRunner;

use crate::app::AppState;
use crate::http::{ApiError, ApiResult};

fn runner(state: &AppState) -> Result<&Arc<HeartbeatRunner<AppState>>, ApiError> {
    state
        .heartbeat()
        .ok_or_else(|| ApiError(SuzentError::Internal("heartbeat not initialized".to_string())))
}

pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    match state.heartbeat() {
        Some(runner) => Ok(Json(serde_json::to_value(runner.status())?)),
        None => Ok(Json(serde_json::json!({
            "enabled": false,
            "running": false,
            "interval_minutes": 0,
            "heartbeat_md_exists": false,
            "last_run_at": null,
            "last_result": null,
            "last_error": null,
        }))),
    }
}

pub async fn enable(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let runner = runner(&state)?;
    if !HeartbeatRunner::enable(runner) {
        return Err(ApiError(SuzentError::invalid_input(
            "HEARTBEAT.md",
            "HEARTBEAT.md not found; create it under the shared workspace to enable",
        )));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn disable(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    runner(&state)?.disable();
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn trigger(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    HeartbeatRunner::trigger_now(runner(&state)?);
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /heartbeat/md — read the checklist file.
pub async fn get_md(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let path = state.config.heartbeat_md_path();
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(Json(serde_json::json!({ "content": content, "exists": true }))),
        Err(_) => Ok(Json(serde_json::json!({ "content": "", "exists": false }))),
    }
}

#[derive(Deserialize)]
pub struct SaveMdBody {
    #[serde(default)]
    pub content: String,
}

/// PUT /heartbeat/md — write the checklist file.
pub async fn save_md(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SaveMdBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = state.config.heartbeat_md_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(SuzentError::Io)?;
    }
    std::fs::write(&path, body.content).map_err(SuzentError::Io)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct IntervalBody {
    pub interval_minutes: u64,
}

/// PUT /heartbeat/interval — change the cadence (minimum 1 minute).
pub async fn set_interval(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IntervalBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.interval_minutes == 0 {
        return Err(ApiError(SuzentError::invalid_input(
            "interval_minutes",
            "must be at least 1",
        )));
    }
    HeartbeatRunner::set_interval(runner(&state)?, body.interval_minutes);
    Ok(Json(serde_json::json!({ "success": true })))
}
