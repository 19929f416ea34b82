pub mod error;
pub mod local;
pub mod manager;
pub mod node;
pub mod proto;
pub mod ws;

pub use error::NodeError;
pub use local::LocalNode;
pub use manager::NodeManager;
pub use node::{Node, NodeCapability, NodeStatus};
pub use proto::{ClientFrame, ServerFrame};
pub use ws::WebSocketNode;
