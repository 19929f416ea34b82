//! Social brain — the consumer loop between channel drivers and the agent.
//!
//! Each inbound message is authorized, mapped to its stable social chat,
//! wrapped in a platform envelope, and run through the shared turn
//! pipeline. The final answer goes back out through the driver; progress
//! updates flow through the agent's social message tool, which holds the
//! same manager handle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use suzent_agent::pipeline::{run_turn_collect, IncomingFile, TurnContext, TurnRequest};
use suzent_core::config::DEFAULT_USER_ID;

use crate::allow::is_authorized;
use crate::manager::ChannelManager;
use crate::types::UnifiedMessage;

pub struct SocialBrain<C: TurnContext> {
    ctx: Arc<C>,
    manager: Arc<ChannelManager>,
    allowed_users: HashSet<String>,
    platform_allowlists: HashMap<String, HashSet<String>>,
}

impl<C: TurnContext> SocialBrain<C> {
    pub fn new(ctx: Arc<C>, manager: Arc<ChannelManager>) -> Self {
        let channels = &ctx.config().channels;
        let allowed_users = channels.allowed_users.iter().cloned().collect();
        let platform_allowlists = channels
            .allowlists
            .iter()
            .map(|(platform, list)| (platform.clone(), list.iter().cloned().collect()))
            .collect();
        Self {
            ctx,
            manager,
            allowed_users,
            platform_allowlists,
        }
    }

    /// Consume the inbound queue until shutdown. Each message is handled in
    /// its own task so a slow turn never blocks the queue.
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<UnifiedMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("social brain started");
        loop {
            tokio::select! {
                msg = inbound.recv() => {
                    match msg {
                        Some(message) => {
                            let brain = Arc::clone(&self);
                            tokio::spawn(async move { brain.handle_message(message).await });
                        }
                        None => {
                            info!("inbound channel closed, social brain stopping");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("social brain shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub async fn handle_message(&self, message: UnifiedMessage) {
        if !is_authorized(
            &self.allowed_users,
            &self.platform_allowlists,
            &message.platform,
            &message.sender_id,
            &message.sender_name,
        ) {
            warn!(
                platform = %message.platform,
                sender = %message.sender_id,
                "unauthorized social message dropped"
            );
            let _ = self
                .manager
                .send_message_to(
                    &message.platform,
                    &message.sender_id,
                    "Access denied. You are not authorized to use this bot.",
                )
                .await;
            return;
        }

        let target_id = message.target_id().to_string();
        let chat_id = social_chat_id(&message.platform, &target_id);
        self.ensure_chat_exists(&chat_id, &message, &target_id);

        info!(chat_id = %chat_id, platform = %message.platform, "processing social message");

        let envelope = format!(
            "[{} {} id:{}]",
            capitalize(&message.platform),
            message.sender_name,
            message.sender_id
        );
        let enriched = format!("{envelope}\n{}", message.content);

        let files = load_attachments(&message);
        let config_override = serde_json::json!({
            "memory_enabled": true,
            "social_context": {
                "platform": message.platform,
                "sender_name": message.sender_name,
                "sender_id": message.sender_id,
                "target_id": target_id,
            }
        });

        let request = TurnRequest {
            chat_id: Some(chat_id.clone()),
            user_id: DEFAULT_USER_ID.to_string(),
            message: enriched,
            files,
            config_override: Some(config_override),
        };

        match run_turn_collect(Arc::clone(&self.ctx), request).await {
            Ok(response) if !response.is_empty() => {
                if let Err(e) = self
                    .manager
                    .send_message_to(&message.platform, &target_id, &response)
                    .await
                {
                    error!(chat_id = %chat_id, error = %e, "reply delivery failed");
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(chat_id = %chat_id, error = %e, "social turn failed");
                let _ = self
                    .manager
                    .send_message_to(&message.platform, &target_id, &format!("Error: {e}"))
                    .await;
            }
        }
    }

    fn ensure_chat_exists(&self, chat_id: &str, message: &UnifiedMessage, target_id: &str) {
        if let Ok(Some(_)) = self.ctx.chats().get(chat_id) {
            return;
        }
        let is_group = target_id != message.sender_id;
        let title = if is_group {
            format!("Group {target_id} ({})", message.platform)
        } else {
            format!("Chat with {} ({})", message.sender_name, message.platform)
        };
        let config = serde_json::json!({
            "platform": message.platform,
            "sender_id": message.sender_id,
            "target_id": target_id,
        });
        info!(chat_id, %title, "creating social chat");
        if let Err(e) = self.ctx.chats().create(Some(chat_id), &title, config, vec![]) {
            error!(chat_id, error = %e, "social chat creation failed");
        }
    }
}

/// Stable chat id for a platform conversation.
pub fn social_chat_id(platform: &str, target_id: &str) -> String {
    format!("social-{platform}-{target_id}")
}

/// Read driver-fetched attachment files into turn inputs. Unreadable files
/// are logged and skipped.
fn load_attachments(message: &UnifiedMessage) -> Vec<IncomingFile> {
    message
        .attachments
        .iter()
        .filter_map(|att| match std::fs::read(&att.path) {
            Ok(content) => Some(IncomingFile {
                filename: att.filename.clone(),
                content,
                content_type: (att.kind == "image").then(|| "image/unknown".to_string()),
            }),
            Err(e) => {
                warn!(path = %att.path, error = %e, "attachment unreadable, skipped");
                None
            }
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().to_string() + chars.as_str(),
    }
}
