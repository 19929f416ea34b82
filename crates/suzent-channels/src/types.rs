use serde::{Deserialize, Serialize};

/// Platform-agnostic inbound message produced by every driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedMessage {
    /// Platform-native message id.
    pub id: String,
    pub content: String,
    pub sender_id: String,
    pub sender_name: String,
    /// Platform tag ("telegram", "slack", …) — matches the driver name.
    pub platform: String,
    /// ISO-8601 receive time.
    pub timestamp: String,
    /// Thread or group id, when the platform has one.
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Full raw payload for drivers that need extra fields downstream.
    #[serde(default)]
    pub raw_data: Option<serde_json::Value>,
}

impl UnifiedMessage {
    /// Reply target: the thread/group when present, else the sender.
    pub fn target_id(&self) -> &str {
        self.thread_id.as_deref().unwrap_or(&self.sender_id)
    }
}

/// A file carried by an inbound message, already fetched to local disk by
/// the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    /// Local path where the driver stored the payload.
    pub path: String,
    /// "image" or "file".
    #[serde(default)]
    pub kind: String,
}

/// Runtime connection state of a channel driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_prefers_thread() {
        let mut msg = UnifiedMessage {
            id: "1".to_string(),
            content: "hi".to_string(),
            sender_id: "u1".to_string(),
            sender_name: "Ada".to_string(),
            platform: "telegram".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            thread_id: None,
            attachments: vec![],
            raw_data: None,
        };
        assert_eq!(msg.target_id(), "u1");

        msg.thread_id = Some("g9".to_string());
        assert_eq!(msg.target_id(), "g9");
    }
}
