use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a chat id.
pub const CHAT_ID_MAX_LEN: usize = 100;
/// Maximum length of a chat title.
pub const CHAT_TITLE_MAX_LEN: usize = 200;

/// One entry in a chat's message log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default = "now_rfc3339")]
    pub timestamp: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: now_rfc3339(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: now_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Generate a fresh chat id.
pub fn new_chat_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validate a caller-supplied chat id: 1..=100 chars of [A-Za-z0-9_-].
pub fn validate_chat_id(id: &str) -> Result<(), crate::error::SuzentError> {
    if id.is_empty() || id.len() > CHAT_ID_MAX_LEN {
        return Err(crate::error::SuzentError::invalid_input(
            "chat_id",
            format!("must be 1..={CHAT_ID_MAX_LEN} characters"),
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(crate::error::SuzentError::invalid_input(
            "chat_id",
            "only A-Z, a-z, 0-9, '_' and '-' are allowed",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_chat_ids_pass() {
        for id in ["abc", "cron-42", "social-telegram-99", "A_b-3"] {
            assert!(validate_chat_id(id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn invalid_chat_ids_rejected() {
        assert!(validate_chat_id("").is_err());
        assert!(validate_chat_id("has space").is_err());
        assert!(validate_chat_id("slash/id").is_err());
        assert!(validate_chat_id(&"x".repeat(101)).is_err());
    }

    #[test]
    fn generated_ids_validate() {
        assert!(validate_chat_id(&new_chat_id()).is_ok());
    }

    #[test]
    fn message_roles_serialize_lowercase() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"user""#));
    }
}
