//! Chat CRUD routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use suzent_chats::types::ChatUpdate;
use suzent_core::types::ChatMessage;
use suzent_core::SuzentError;

use crate::app::AppState;
use crate::http::{ApiError, ApiResult};

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub search: Option<String>,
}

fn default_limit() -> usize {
    50
}

pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let chats = state.chats.list(query.limit, query.offset, search)?;
    let total = state.chats.count(search)?;
    Ok(Json(serde_json::json!({
        "chats": chats,
        "total": total,
        "limit": query.limit,
        "offset": query.offset,
        "search": search,
    })))
}

#[derive(Deserialize)]
pub struct CreateChatBody {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

fn default_title() -> String {
    "New Chat".to_string()
}

pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateChatBody>,
) -> ApiResult<impl IntoResponse> {
    let config = if body.config.is_null() {
        serde_json::json!({})
    } else {
        body.config
    };
    let chat = state
        .chats
        .create(body.chat_id.as_deref(), &body.title, config, body.messages)?;
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<suzent_chats::Chat>> {
    match state.chats.get(&id)? {
        Some(chat) => Ok(Json(chat)),
        None => Err(ApiError(SuzentError::NotFound(id))),
    }
}

#[derive(Deserialize)]
pub struct UpdateChatBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
}

pub async fn update_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateChatBody>,
) -> ApiResult<Json<suzent_chats::Chat>> {
    state.chats.update(
        &id,
        ChatUpdate {
            title: body.title,
            config: body.config,
            messages: body.messages,
            agent_state: None,
        },
    )?;
    match state.chats.get(&id)? {
        Some(chat) => Ok(Json(chat)),
        None => Err(ApiError(SuzentError::NotFound(id))),
    }
}

pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.chats.delete(&id)?;
    Ok(Json(serde_json::json!({ "message": "chat deleted" })))
}

/// GET /chats/{id}/plan — latest plan plus version history.
pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let latest = state.chats.latest_plan(&id)?;
    let history = state.chats.list_plans(&id)?;
    Ok(Json(serde_json::json!({ "plan": latest, "history": history })))
}
