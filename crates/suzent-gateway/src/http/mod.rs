pub mod chat;
pub mod chats;
pub mod cron;
pub mod health;
pub mod heartbeat;
pub mod memory;
pub mod nodes;
pub mod prefs;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use suzent_core::SuzentError;

/// Boundary error wrapper: maps `SuzentError` kinds to HTTP statuses and a
/// JSON body. Internal errors log the detail and return a generic message.
pub struct ApiError(pub SuzentError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "internal error");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<SuzentError> for ApiError {
    fn from(e: SuzentError) -> Self {
        ApiError(e)
    }
}

impl From<suzent_chats::ChatStoreError> for ApiError {
    fn from(e: suzent_chats::ChatStoreError) -> Self {
        ApiError(e.into())
    }
}

impl From<suzent_scheduler::SchedulerError> for ApiError {
    fn from(e: suzent_scheduler::SchedulerError) -> Self {
        ApiError(e.into())
    }
}

impl From<suzent_nodes::NodeError> for ApiError {
    fn from(e: suzent_nodes::NodeError) -> Self {
        ApiError(e.into())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError(SuzentError::Serialization(e))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
