//! POST /chat — run a turn and stream it back as SSE.
//!
//! Accepts a JSON body or multipart form-data (for file uploads):
//! - `message`: the user's message
//! - `chat_id`: optional target chat
//! - `config`: optional agent config override (JSON object / JSON string)
//! - `stream`: JSON only; `false` collects the turn into `{response}`
//! - `files`: multipart only
//!
//! POST /chat/stop cancels the active stream for a chat.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, RequestExt};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use suzent_agent::pipeline::{process_turn, IncomingFile, TurnRequest};
use suzent_core::config::DEFAULT_USER_ID;
use suzent_core::types::validate_chat_id;
use suzent_core::SuzentError;

use crate::app::AppState;
use crate::http::ApiError;

#[derive(Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    chat_id: Option<String>,
    #[serde(default)]
    config: Option<serde_json::Value>,
    #[serde(default = "bool_true")]
    stream: bool,
}

fn bool_true() -> bool {
    true
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let (body, files, stream) = if content_type.starts_with("multipart/form-data") {
        let multipart = request
            .extract::<Multipart, _>()
            .await
            .map_err(|e| SuzentError::invalid_input("body", e.to_string()))?;
        let (body, files) = parse_multipart(multipart).await?;
        // Multipart always streams.
        (body, files, true)
    } else {
        let Json(body) = request
            .extract::<Json<ChatBody>, _>()
            .await
            .map_err(|e| SuzentError::invalid_input("body", e.to_string()))?;
        let stream = body.stream;
        (body, Vec::new(), stream)
    };

    if body.message.trim().is_empty() && files.is_empty() {
        return Err(SuzentError::invalid_input("message", "empty message received").into());
    }
    if let Some(ref chat_id) = body.chat_id {
        validate_chat_id(chat_id)?;
        // Per-chat turns are serialized; a busy chat is a 409 at the boundary.
        if state.streams.is_active(chat_id) {
            return Err(SuzentError::StreamActive {
                chat_id: chat_id.clone(),
            }
            .into());
        }
    }

    info!(
        chat_id = body.chat_id.as_deref().unwrap_or("<new>"),
        message_len = body.message.len(),
        files = files.len(),
        "chat request received"
    );

    let turn = TurnRequest {
        chat_id: body.chat_id,
        user_id: DEFAULT_USER_ID.to_string(),
        message: body.message,
        files,
        config_override: body.config,
    };
    let frames = process_turn(state, turn);

    if stream {
        let events = frames.map(|frame| Ok::<_, Infallible>(frame_to_event(&frame)));
        return Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response());
    }

    // Non-streaming: drain the frames and return the final answer as JSON.
    futures_util::pin_mut!(frames);
    let mut response_text = String::new();
    while let Some(frame) = frames.next().await {
        let Some(json) = frame.strip_prefix("data: ") else {
            continue;
        };
        let Ok(event) = serde_json::from_str::<serde_json::Value>(json.trim()) else {
            continue;
        };
        match event.get("type").and_then(|t| t.as_str()) {
            Some("final_answer") => {
                response_text = event
                    .get("data")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string();
            }
            Some("error") => {
                let message = event
                    .get("data")
                    .and_then(|d| d.as_str())
                    .unwrap_or("turn failed")
                    .to_string();
                return Ok((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": message })),
                )
                    .into_response());
            }
            _ => {}
        }
    }
    Ok(Json(serde_json::json!({ "response": response_text })).into_response())
}

/// Frames are `data: <json>\n\n`; axum's SSE writer re-adds the framing.
fn frame_to_event(frame: &str) -> Event {
    let payload = frame
        .strip_prefix("data: ")
        .unwrap_or(frame)
        .trim_end_matches('\n');
    Event::default().data(payload)
}

async fn parse_multipart(
    mut multipart: Multipart,
) -> Result<(ChatBody, Vec<IncomingFile>), ApiError> {
    let mut body = ChatBody {
        message: String::new(),
        chat_id: None,
        config: None,
        stream: true,
    };
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SuzentError::invalid_input("multipart", e.to_string()))?
    {
        match field.name().unwrap_or("") {
            "message" => body.message = field.text().await.unwrap_or_default(),
            "chat_id" => {
                let value = field.text().await.unwrap_or_default();
                if !value.is_empty() {
                    body.chat_id = Some(value);
                }
            }
            "config" => {
                let raw = field.text().await.unwrap_or_default();
                match serde_json::from_str(&raw) {
                    Ok(value) => body.config = Some(value),
                    Err(e) => warn!(error = %e, "ignoring malformed config field"),
                }
            }
            "files" => {
                let filename = field
                    .file_name()
                    .unwrap_or("unnamed")
                    .to_string();
                let content_type = field.content_type().map(|ct| ct.to_string());
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| SuzentError::invalid_input("files", e.to_string()))?;
                files.push(IncomingFile {
                    filename,
                    content: content.to_vec(),
                    content_type,
                });
            }
            other => warn!(field = other, "ignoring unknown multipart field"),
        }
    }
    Ok((body, files))
}

#[derive(Deserialize)]
pub struct StopBody {
    pub chat_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /chat/stop — raise the cancel signal for a chat's active stream.
pub async fn stop_chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StopBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.chat_id.is_empty() {
        return Err(SuzentError::invalid_input("chat_id", "chat_id is required").into());
    }
    let reason = body
        .reason
        .unwrap_or_else(|| "Stream stopped by user".to_string());

    if !state.streams.stop(&body.chat_id, &reason) {
        return Err(SuzentError::NotFound(format!(
            "no active stream for chat {}",
            body.chat_id
        ))
        .into());
    }
    Ok(Json(serde_json::json!({ "status": "stopping", "reason": reason })))
}
