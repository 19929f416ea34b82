//! Wire protocol for the `/ws/node` gateway.
//!
//! All frames are tagged JSON objects. Companion devices speak
//! [`ClientFrame`]s; the server replies with [`ServerFrame`]s.

use serde::{Deserialize, Serialize};

use crate::node::NodeCapability;

/// Frames received from a companion device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Initial handshake — must be the first frame on the socket.
    Connect {
        display_name: String,
        #[serde(default = "default_platform")]
        platform: String,
        #[serde(default)]
        capabilities: Vec<NodeCapability>,
    },
    /// Response to a server `invoke`.
    Result {
        request_id: String,
        #[serde(default)]
        success: bool,
        #[serde(default)]
        result: serde_json::Value,
        #[serde(default)]
        error: Option<String>,
    },
    /// Heartbeat response.
    Pong,
    /// Unsolicited event from the node.
    Event {
        event: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

fn default_platform() -> String {
    "unknown".to_string()
}

/// Frames sent to a companion device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake acknowledgment carrying the assigned node id.
    Connected { node_id: String },
    /// Dispatch a command to the node.
    Invoke {
        request_id: String,
        command: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Heartbeat check.
    Ping,
    /// Protocol error (usually followed by a close).
    Error { message: String },
}

/// Outcome of an invocation, shared by all node kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeOutcome {
    pub success: bool,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_frame_round_trip() {
        let json = r#"{"type":"connect","display_name":"iPhone","platform":"ios",
            "capabilities":[{"name":"camera.snap","description":"Take a photo","params_schema":{"format":"str"}}]}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::Connect {
                display_name,
                platform,
                capabilities,
            } => {
                assert_eq!(display_name, "iPhone");
                assert_eq!(platform, "ios");
                assert_eq!(capabilities.len(), 1);
                assert_eq!(capabilities[0].name, "camera.snap");
            }
            _ => panic!("expected connect frame"),
        }
    }

    #[test]
    fn connect_defaults_platform() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"connect","display_name":"X"}"#).unwrap();
        match frame {
            ClientFrame::Connect { platform, .. } => assert_eq!(platform, "unknown"),
            _ => panic!("expected connect frame"),
        }
    }

    #[test]
    fn invoke_frame_serialization() {
        let frame = ServerFrame::Invoke {
            request_id: "r1".to_string(),
            command: "echo.test".to_string(),
            params: serde_json::json!({"msg": "hi"}),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"invoke""#));
        assert!(json.contains(r#""request_id":"r1""#));
        assert!(json.contains(r#""msg":"hi""#));
    }

    #[test]
    fn result_frame_round_trip() {
        let json = r#"{"type":"result","request_id":"r1","success":true,"result":{"echo":"hi"}}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::Result {
                request_id,
                success,
                result,
                error,
            } => {
                assert_eq!(request_id, "r1");
                assert!(success);
                assert_eq!(result["echo"], "hi");
                assert!(error.is_none());
            }
            _ => panic!("expected result frame"),
        }
    }

    #[test]
    fn malformed_frame_fails_to_parse() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"bogus"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
    }
}
