use thiserror::Error;

#[derive(Debug, Error)]
pub enum SuzentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input ({field}): {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("A stream is already active for chat {chat_id}")]
    StreamActive { chat_id: String },

    #[error("No LLM models are enabled. Configure a provider first.")]
    NoModelConfigured,

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SuzentError {
    /// HTTP status code this error maps to at the API boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            SuzentError::InvalidInput { .. } => 400,
            SuzentError::UnknownAgentType(_) => 400,
            SuzentError::NotFound(_) => 404,
            SuzentError::AlreadyExists(_) => 409,
            SuzentError::StreamActive { .. } => 409,
            SuzentError::NoModelConfigured => 503,
            SuzentError::Timeout { .. } => 504,
            SuzentError::Connection(_) => 502,
            _ => 500,
        }
    }

    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SuzentError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SuzentError>;
