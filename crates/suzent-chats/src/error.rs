use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatStoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Chat not found: {id}")]
    NotFound { id: String },

    #[error("Chat already exists: {id}")]
    AlreadyExists { id: String },

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ChatStoreError> for suzent_core::SuzentError {
    fn from(e: ChatStoreError) -> Self {
        match e {
            ChatStoreError::NotFound { id } => suzent_core::SuzentError::NotFound(id),
            ChatStoreError::AlreadyExists { id } => suzent_core::SuzentError::AlreadyExists(id),
            ChatStoreError::InvalidInput { field, reason } => {
                suzent_core::SuzentError::InvalidInput { field, reason }
            }
            ChatStoreError::Database(e) => suzent_core::SuzentError::Database(e.to_string()),
            ChatStoreError::Serialization(e) => suzent_core::SuzentError::Serialization(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatStoreError>;
