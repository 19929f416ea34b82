use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Node '{node}' is disconnected")]
    NotConnected { node: String },

    #[error("Node '{node}' does not support command '{command}'. Available: {available}")]
    UnsupportedCommand {
        node: String,
        command: String,
        available: String,
    },

    #[error("Node '{node}' did not respond to '{command}' within {secs}s")]
    Timeout {
        node: String,
        command: String,
        secs: u64,
    },

    #[error("Node connection lost: {0}")]
    Disconnected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<NodeError> for suzent_core::SuzentError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::NotFound(id) => suzent_core::SuzentError::NotFound(id),
            NodeError::UnsupportedCommand { .. } => {
                suzent_core::SuzentError::NotFound(e.to_string())
            }
            NodeError::Timeout { secs, .. } => {
                suzent_core::SuzentError::Timeout { ms: secs * 1000 }
            }
            NodeError::NotConnected { .. } | NodeError::Disconnected(_) => {
                suzent_core::SuzentError::Connection(e.to_string())
            }
            NodeError::Protocol(msg) => suzent_core::SuzentError::Internal(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
