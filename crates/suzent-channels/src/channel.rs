use async_trait::async_trait;

use crate::error::ChannelError;
use crate::types::ChannelStatus;

/// Common interface implemented by every platform driver (Telegram, Slack,
/// Discord, Feishu, …). The SDK integrations live out-of-tree; the core
/// only depends on this trait.
///
/// Inbound messages are pushed into the queue handed over at registration
/// time ([`ChannelManager::register`](crate::manager::ChannelManager::register)),
/// not pulled from the driver.
#[async_trait]
pub trait SocialChannel: Send + Sync {
    /// Stable lowercase platform tag (e.g. `"telegram"`). Unique across all
    /// registered drivers.
    fn name(&self) -> &str;

    /// Establish the connection to the external service and start pushing
    /// inbound messages into the registered queue.
    async fn connect(&mut self) -> Result<(), ChannelError>;

    /// Gracefully close the connection.
    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// Deliver a text message to a platform-native target.
    async fn send_message(&self, target_id: &str, content: &str) -> Result<(), ChannelError>;

    /// Deliver a file with an optional caption.
    async fn send_file(
        &self,
        target_id: &str,
        path: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Current runtime status without blocking.
    fn status(&self) -> ChannelStatus;
}
