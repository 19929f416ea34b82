pub mod allow;
pub mod brain;
pub mod channel;
pub mod error;
pub mod manager;
pub mod types;

pub use brain::SocialBrain;
pub use channel::SocialChannel;
pub use error::ChannelError;
pub use manager::ChannelManager;
pub use types::{Attachment, ChannelStatus, UnifiedMessage};
