//! The chat turn processor — one pipeline shared by every entry point.
//!
//! `process_turn` runs the full turn: config merge → agent acquisition →
//! state restore → context injection → attachments → streaming run →
//! post-run memory extraction, compression, and persistence. The caller
//! only consumes SSE frames; the HTTP route, scheduler, heartbeat, and
//! social consumer all sit on top of this one function.

use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use suzent_chats::types::ChatUpdate;
use suzent_core::types::{validate_chat_id, ChatMessage};
use suzent_memory::types::ConversationTurn;

use crate::codec::{decode_agent, encode_agent};
use crate::compressor::ContextCompressor;
use crate::events::AgentEvent;
use crate::prompts::SocialContext;
use crate::tools::{SocialRuntime, TurnRuntime};

use super::attach::store_attachments;
pub use super::attach::IncomingFile;
use super::context::TurnContext;

/// Inputs of one conversation turn.
#[derive(Debug, Default)]
pub struct TurnRequest {
    /// Target chat; generated when absent.
    pub chat_id: Option<String>,
    pub user_id: String,
    pub message: String,
    pub files: Vec<IncomingFile>,
    /// Merged over user preferences; wins on conflicts.
    pub config_override: Option<serde_json::Value>,
}

/// Run a turn, yielding SSE frames (`data: <json>\n\n`).
///
/// Any setup failure produces a single `error` frame and ends the stream.
/// Post-run bookkeeping errors are logged, never surfaced. On cancellation
/// the turn persists nothing.
pub fn process_turn<C: TurnContext>(
    ctx: Arc<C>,
    req: TurnRequest,
) -> impl Stream<Item = String> {
    async_stream::stream! {
        if req.message.trim().is_empty() && req.files.is_empty() {
            yield AgentEvent::Error("Empty message received.".to_string()).sse_frame();
            return;
        }

        // Resolve the chat id and make sure the chat row exists.
        let chat_id = match req.chat_id {
            Some(ref id) => {
                if let Err(e) = validate_chat_id(id) {
                    yield AgentEvent::Error(e.to_string()).sse_frame();
                    return;
                }
                id.clone()
            }
            None => suzent_core::types::new_chat_id(),
        };
        if let Ok(None) = ctx.chats().get(&chat_id) {
            let title: String = req.message.chars().take(50).collect();
            let title = if title.is_empty() { "New Chat".to_string() } else { title };
            if let Err(e) = ctx.chats().create(Some(&chat_id), &title, serde_json::json!({}), vec![]) {
                yield AgentEvent::Error(e.to_string()).sse_frame();
                return;
            }
        }

        // Effective config: base < user preferences < request override.
        let config = merge_turn_config(&ctx, &chat_id, &req.user_id, req.config_override.as_ref());

        // Acquire (or build) the agent, then restore this chat's state.
        let mut agent = match ctx.agents().get_or_create(&config, false).await {
            Ok(agent) => agent,
            Err(e) => {
                yield AgentEvent::Error(e.to_string()).sse_frame();
                return;
            }
        };
        match ctx.chats().get_agent_state(&chat_id) {
            Ok(Some(bytes)) => {
                match decode_agent(&bytes, agent.clone()) {
                    Some(restored) => agent = restored,
                    None => warn!(%chat_id, "agent state undecodable, starting fresh"),
                }
            }
            Ok(None) => {}
            Err(e) => error!(%chat_id, error = %e, "agent state load failed"),
        }

        // Per-turn runtime handles for stateful tools.
        let social_runtime = build_social_runtime(&ctx, &config);
        agent.inject_context(&TurnRuntime {
            chat_id: chat_id.clone(),
            user_id: req.user_id.clone(),
            social: social_runtime,
        });

        // Retrieval context: archival facts relevant to the incoming message
        // ride along in the instructions for this turn.
        let memory_enabled = config
            .get("memory_enabled")
            .and_then(|m| m.as_bool())
            .unwrap_or(false);
        if memory_enabled {
            if let Some(memory) = ctx.memory() {
                match memory
                    .format_retrieval_context(&req.message, &req.user_id, 5)
                    .await
                {
                    Ok(Some(retrieval)) => {
                        agent.instructions.push_str("\n\n");
                        agent.instructions.push_str(&retrieval);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(%chat_id, error = %e, "retrieval context failed"),
                }
            }
        }

        // Attachments.
        let uploads_dir = ctx.config().uploads_dir(&chat_id);
        let attachments = store_attachments(&uploads_dir, &req.files);
        let full_prompt = format!("{}{}", req.message, attachments.annotation);

        // At most one stream per chat.
        let guard = match ctx.streams().register(&chat_id) {
            Ok(guard) => guard,
            Err(e) => {
                yield AgentEvent::Error(e.to_string()).sse_frame();
                return;
            }
        };
        let cancel = guard.controller().cancel_token();

        info!(%chat_id, user = %req.user_id, "turn started");

        // Run the agent in its own task; events flow back over the channel.
        let (tx, mut rx) = mpsc::channel::<AgentEvent>(64);
        let images = attachments.image_paths.clone();
        let run_handle = tokio::spawn(async move {
            let answer = agent.run(&full_prompt, images, cancel, tx).await;
            (agent, answer)
        });

        let mut final_answer: Option<String> = None;
        while let Some(event) = rx.recv().await {
            if let Some(answer) = event.final_answer() {
                final_answer = Some(answer.to_string());
            }
            yield event.sse_frame();
        }

        let (mut agent, run_answer) = match run_handle.await {
            Ok(pair) => pair,
            Err(e) => {
                error!(%chat_id, error = %e, "agent task panicked");
                yield AgentEvent::Error("internal agent failure".to_string()).sse_frame();
                return;
            }
        };
        let final_answer = final_answer.or(run_answer);

        if guard.controller().is_cancelled() {
            // Cancelled turns leave no trace: no messages, no state.
            info!(
                %chat_id,
                reason = guard.controller().cancel_reason().as_deref().unwrap_or("unknown"),
                "turn cancelled, skipping persistence"
            );
            return;
        }

        // Post-run bookkeeping — best-effort, in order: extract, compress,
        // persist. The stream consumer sees none of this.
        if memory_enabled {
            if let Some(memory) = ctx.memory() {
                let (actions, reasoning) = agent.memory.succinct_steps();
                let turn = ConversationTurn {
                    user_message: req.message.clone(),
                    assistant_message: final_answer.clone().unwrap_or_default(),
                    agent_actions: actions,
                    agent_reasoning: reasoning,
                };
                memory.process_turn(&turn, &chat_id, &req.user_id).await;
            }
        }

        let max_history_steps = config
            .get("max_history_steps")
            .and_then(|m| m.as_u64())
            .map(|m| m as usize)
            .unwrap_or(ctx.config().agent.max_history_steps);
        let compressor = ContextCompressor::new(
            ctx.summarizer(),
            max_history_steps,
            ctx.config().agent.max_context_tokens,
        );
        compressor
            .compress_if_needed(&mut agent, &chat_id, &req.user_id, ctx.memory())
            .await;

        persist_turn(&ctx, &chat_id, &req.message, final_answer.as_deref(), &agent);
        info!(%chat_id, "turn finished");
    }
}

/// Consume a turn's stream and return the final answer, or the first error.
///
/// Used by the scheduler, heartbeat, and social consumer, which need the
/// result rather than the frames.
pub async fn run_turn_collect<C: TurnContext>(
    ctx: Arc<C>,
    req: TurnRequest,
) -> Result<String, String> {
    use futures_util::StreamExt;

    let stream = process_turn(ctx, req);
    futures_util::pin_mut!(stream);

    let mut final_answer = String::new();
    while let Some(frame) = stream.next().await {
        let Some(json) = frame.strip_prefix("data: ") else {
            continue;
        };
        let Ok(event) = serde_json::from_str::<serde_json::Value>(json.trim()) else {
            continue;
        };
        match event.get("type").and_then(|t| t.as_str()) {
            Some("final_answer") => {
                final_answer = event
                    .get("data")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string();
            }
            Some("error") => {
                let message = event
                    .get("data")
                    .and_then(|d| d.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(message);
            }
            _ => {}
        }
    }
    Ok(final_answer.trim().to_string())
}

fn merge_turn_config<C: TurnContext>(
    ctx: &Arc<C>,
    chat_id: &str,
    user_id: &str,
    config_override: Option<&serde_json::Value>,
) -> serde_json::Value {
    let mut config = serde_json::Map::new();
    config.insert("_chat_id".to_string(), serde_json::json!(chat_id));
    config.insert("_user_id".to_string(), serde_json::json!(user_id));
    config.insert(
        "memory_enabled".to_string(),
        serde_json::json!(ctx.config().memory.enabled),
    );

    // Persisted user defaults fill in what the request left out.
    match ctx.chats().get_preferences(user_id) {
        Ok(Some(prefs)) => {
            if let Some(model) = prefs.model {
                config.insert("model".to_string(), serde_json::json!(model));
            }
            if let Some(agent) = prefs.agent {
                config.insert("agent".to_string(), serde_json::json!(agent));
            }
            if let Some(tools) = prefs.tools {
                config.insert("tools".to_string(), serde_json::json!(tools));
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "user preference load failed"),
    }

    if let Some(serde_json::Value::Object(over)) = config_override {
        for (key, value) in over {
            config.insert(key.clone(), value.clone());
        }
    }

    serde_json::Value::Object(config)
}

fn build_social_runtime<C: TurnContext>(
    ctx: &Arc<C>,
    config: &serde_json::Value,
) -> Option<SocialRuntime> {
    let social: SocialContext =
        serde_json::from_value(config.get("social_context")?.clone()).ok()?;
    let sender = ctx.social_sender()?;
    Some(SocialRuntime {
        sender,
        platform: social.platform,
        default_target: social.target_id,
    })
}

fn persist_turn<C: TurnContext>(
    ctx: &Arc<C>,
    chat_id: &str,
    user_message: &str,
    final_answer: Option<&str>,
    agent: &crate::agent::Agent,
) {
    let mut messages = match ctx.chats().get(chat_id) {
        Ok(Some(chat)) => chat.messages,
        Ok(None) => Vec::new(),
        Err(e) => {
            error!(chat_id, error = %e, "chat load failed, skipping persistence");
            return;
        }
    };
    messages.push(ChatMessage::user(user_message));
    messages.push(ChatMessage::assistant(final_answer.unwrap_or_default()));

    let update = ChatUpdate {
        messages: Some(messages),
        agent_state: encode_agent(agent),
        ..Default::default()
    };
    if let Err(e) = ctx.chats().update(chat_id, update) {
        error!(chat_id, error = %e, "turn persistence failed");
    }
}
