//! User preference and MCP server registry routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use suzent_chats::types::{McpServer, UserPreferences};
use suzent_core::config::DEFAULT_USER_ID;
use suzent_core::SuzentError;

use crate::app::AppState;
use crate::http::{ApiError, ApiResult};

#[derive(Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = query.user_id.as_deref().unwrap_or(DEFAULT_USER_ID);
    let prefs = state.chats.get_preferences(user_id)?.unwrap_or_default();
    Ok(Json(serde_json::json!({ "preferences": prefs })))
}

#[derive(Deserialize)]
pub struct SavePreferencesBody {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub preferences: UserPreferences,
}

pub async fn save_preferences(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SavePreferencesBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = body.user_id.as_deref().unwrap_or(DEFAULT_USER_ID);
    state.chats.save_preferences(user_id, &body.preferences)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn list_mcp_servers(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let servers = state.chats.list_mcp_servers()?;
    Ok(Json(serde_json::json!({ "servers": servers })))
}

pub async fn save_mcp_server(
    State(state): State<Arc<AppState>>,
    Json(server): Json<McpServer>,
) -> ApiResult<Json<serde_json::Value>> {
    if server.name.trim().is_empty() {
        return Err(ApiError(SuzentError::invalid_input("name", "name is required")));
    }
    match server.transport.as_str() {
        "http" if server.url.is_none() => {
            return Err(ApiError(SuzentError::invalid_input(
                "url",
                "http transport requires a url",
            )));
        }
        "stdio" if server.command.is_none() => {
            return Err(ApiError(SuzentError::invalid_input(
                "command",
                "stdio transport requires a command",
            )));
        }
        "http" | "stdio" => {}
        other => {
            return Err(ApiError(SuzentError::invalid_input(
                "transport",
                format!("unknown transport '{other}' (expected http or stdio)"),
            )));
        }
    }
    state.chats.save_mcp_server(&server)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete_mcp_server(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.chats.delete_mcp_server(&name)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct EnabledBody {
    pub enabled: bool,
}

pub async fn set_mcp_server_enabled(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<EnabledBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state.chats.set_mcp_server_enabled(&name, body.enabled)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
