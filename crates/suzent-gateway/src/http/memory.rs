//! Memory routes — archival search, core blocks, reindex, stats.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use suzent_core::config::DEFAULT_USER_ID;
use suzent_core::SuzentError;
use suzent_memory::indexer::MarkdownIndexer;
use suzent_memory::MemoryManager;

use crate::app::AppState;
use crate::http::{ApiError, ApiResult};

fn memory(state: &AppState) -> Result<&Arc<MemoryManager>, ApiError> {
    state
        .memory
        .as_ref()
        .ok_or_else(|| ApiError(SuzentError::Internal("memory system disabled".to_string())))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub min_importance: Option<f32>,
}

fn default_k() -> usize {
    5
}

/// GET /memory/archival?q=&k=&user_id=&min_importance=
pub async fn search_archival(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    if query.q.trim().is_empty() {
        return Err(ApiError(SuzentError::invalid_input("q", "query is required")));
    }
    let manager = memory(&state)?;
    let user_id = query.user_id.as_deref().unwrap_or(DEFAULT_USER_ID);
    let results = manager
        .search(&query.q, user_id, query.k, query.min_importance)
        .await
        .map_err(|e| ApiError(SuzentError::Internal(e.to_string())))?;
    Ok(Json(serde_json::json!({ "results": results })))
}

#[derive(Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// GET /memory/core — all core blocks for a user.
pub async fn get_core_memory(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = memory(&state)?;
    let user_id = query.user_id.as_deref().unwrap_or(DEFAULT_USER_ID);
    let blocks = manager
        .vector()
        .get_core_blocks(user_id)
        .map_err(|e| ApiError(SuzentError::Internal(e.to_string())))?;
    let blocks: serde_json::Map<String, serde_json::Value> = blocks
        .into_iter()
        .map(|(label, content)| (label, serde_json::json!(content)))
        .collect();
    Ok(Json(serde_json::json!({ "blocks": blocks })))
}

#[derive(Deserialize)]
pub struct CoreBlockBody {
    pub label: String,
    pub content: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// PUT /memory/core — replace one core block.
pub async fn update_core_block(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CoreBlockBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = memory(&state)?;
    let user_id = body.user_id.as_deref().unwrap_or(DEFAULT_USER_ID);
    manager
        .vector()
        .set_core_block(user_id, &body.label, &body.content)
        .map_err(|e| match e {
            suzent_memory::MemoryError::UnknownLabel(label) => {
                ApiError(SuzentError::invalid_input("label", label))
            }
            other => ApiError(SuzentError::Internal(other.to_string())),
        })?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct ReindexBody {
    #[serde(default)]
    pub clear_existing: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /memory/reindex — rebuild the vector index from the markdown logs.
pub async fn reindex(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReindexBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = memory(&state)?;
    let markdown = manager.markdown().ok_or_else(|| {
        ApiError(SuzentError::Internal("markdown store disabled".to_string()))
    })?;
    let user_id = body.user_id.as_deref().unwrap_or(DEFAULT_USER_ID);

    let stats = MarkdownIndexer::reindex(
        markdown,
        manager.vector(),
        manager.embedder(),
        user_id,
        body.clear_existing,
    )
    .await
    .map_err(|e| ApiError(SuzentError::Internal(e.to_string())))?;

    Ok(Json(serde_json::json!({ "stats": stats })))
}

/// GET /memory/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let manager = memory(&state)?;
    let stats = manager
        .stats()
        .map_err(|e| ApiError(SuzentError::Internal(e.to_string())))?;
    Ok(Json(serde_json::json!({ "stats": stats })))
}

fn markdown(state: &AppState) -> Result<Arc<suzent_memory::MarkdownMemoryStore>, ApiError> {
    memory(state)?
        .markdown()
        .cloned()
        .ok_or_else(|| ApiError(SuzentError::Internal("markdown store disabled".to_string())))
}

/// GET /memory/logs — available daily log dates, newest first.
pub async fn list_daily_logs(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = markdown(&state)?;
    let dates = store
        .list_daily_logs()
        .await
        .map_err(|e| ApiError(SuzentError::Internal(e.to_string())))?;
    Ok(Json(serde_json::json!({ "dates": dates })))
}

/// GET /memory/logs/{date} — one daily log's content.
pub async fn get_daily_log(
    State(state): State<Arc<AppState>>,
    axum::extract::Path(date): axum::extract::Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = markdown(&state)?;
    match store
        .read_daily_log(&date)
        .await
        .map_err(|e| ApiError(SuzentError::Internal(e.to_string())))?
    {
        Some(content) => Ok(Json(serde_json::json!({ "date": date, "content": content }))),
        None => Err(ApiError(SuzentError::NotFound(format!("daily log {date}")))),
    }
}

/// GET /memory/file — the curated MEMORY.md.
pub async fn get_memory_file(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = markdown(&state)?;
    let content = store
        .read_memory_file()
        .await
        .map_err(|e| ApiError(SuzentError::Internal(e.to_string())))?;
    Ok(Json(serde_json::json!({
        "exists": content.is_some(),
        "content": content.unwrap_or_default(),
    })))
}

#[derive(Deserialize)]
pub struct MemoryFileBody {
    #[serde(default)]
    pub content: String,
}

/// PUT /memory/file — replace the curated MEMORY.md body.
pub async fn save_memory_file(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MemoryFileBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let store = markdown(&state)?;
    store
        .write_memory_file(&body.content)
        .await
        .map_err(|e| ApiError(SuzentError::Internal(e.to_string())))?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
