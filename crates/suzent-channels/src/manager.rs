//! Driver registry and message routing for social channels.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, info, warn};

use suzent_agent::tools::SocialSender;

use crate::channel::SocialChannel;
use crate::error::{ChannelError, Result};
use crate::types::{ChannelStatus, UnifiedMessage};

/// Inbound queue depth before drivers start seeing backpressure.
const QUEUE_CAPACITY: usize = 256;

/// Central coordinator for all social channels.
///
/// Drivers push inbound messages into the shared queue via
/// [`inbound_sender`](Self::inbound_sender); the consumer
/// ([`SocialBrain`](crate::brain::SocialBrain)) takes the receiver once at
/// startup. Outbound sends route to the driver registered under the
/// platform tag.
pub struct ChannelManager {
    channels: RwLock<HashMap<String, Box<dyn SocialChannel>>>,
    inbound_tx: mpsc::Sender<UnifiedMessage>,
    inbound_rx: Mutex<Option<mpsc::Receiver<UnifiedMessage>>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            channels: RwLock::new(HashMap::new()),
            inbound_tx: tx,
            inbound_rx: Mutex::new(Some(rx)),
        }
    }

    /// Sender handed to drivers so they can push inbound messages.
    pub fn inbound_sender(&self) -> mpsc::Sender<UnifiedMessage> {
        self.inbound_tx.clone()
    }

    /// Take the inbound receiver. Returns `None` after the first call —
    /// exactly one consumer loop owns the queue.
    pub async fn take_receiver(&self) -> Option<mpsc::Receiver<UnifiedMessage>> {
        self.inbound_rx.lock().await.take()
    }

    /// Register a driver under its platform tag, replacing any previous one.
    pub async fn register(&self, channel: Box<dyn SocialChannel>) {
        let name = channel.name().to_string();
        info!(platform = %name, "registering channel driver");
        self.channels.write().await.insert(name, channel);
    }

    /// Connect every registered driver. Failures are logged and skipped so
    /// one broken platform never blocks the rest.
    pub async fn connect_all(&self) {
        let mut channels = self.channels.write().await;
        for (name, channel) in channels.iter_mut() {
            match channel.connect().await {
                Ok(()) => info!(platform = %name, "channel connected"),
                Err(e) => error!(platform = %name, error = %e, "channel connect failed"),
            }
        }
    }

    /// Disconnect every registered driver.
    pub async fn disconnect_all(&self) {
        let mut channels = self.channels.write().await;
        for (name, channel) in channels.iter_mut() {
            if let Err(e) = channel.disconnect().await {
                warn!(platform = %name, error = %e, "channel disconnect failed");
            }
        }
    }

    /// Platform tag → status for every registered driver, sorted by tag.
    pub async fn statuses(&self) -> Vec<(String, ChannelStatus)> {
        let channels = self.channels.read().await;
        let mut result: Vec<(String, ChannelStatus)> = channels
            .iter()
            .map(|(name, ch)| (name.clone(), ch.status()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Route a text message to the named platform's driver.
    pub async fn send_message_to(
        &self,
        platform: &str,
        target_id: &str,
        content: &str,
    ) -> Result<()> {
        let channels = self.channels.read().await;
        let channel = channels
            .get(platform)
            .ok_or_else(|| ChannelError::UnknownPlatform(platform.to_string()))?;
        channel.send_message(target_id, content).await
    }

    /// Route a file to the named platform's driver.
    pub async fn send_file_to(
        &self,
        platform: &str,
        target_id: &str,
        path: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let channels = self.channels.read().await;
        let channel = channels
            .get(platform)
            .ok_or_else(|| ChannelError::UnknownPlatform(platform.to_string()))?;
        channel.send_file(target_id, path, caption).await
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// The agent's social message tool sends through this handle.
#[async_trait]
impl SocialSender for ChannelManager {
    async fn send_message(
        &self,
        platform: &str,
        target_id: &str,
        content: &str,
    ) -> std::result::Result<(), String> {
        self.send_message_to(platform, target_id, content)
            .await
            .map_err(|e| e.to_string())
    }

    async fn send_file(
        &self,
        platform: &str,
        target_id: &str,
        path: &str,
        caption: Option<&str>,
    ) -> std::result::Result<(), String> {
        self.send_file_to(platform, target_id, path, caption)
            .await
            .map_err(|e| e.to_string())
    }
}
