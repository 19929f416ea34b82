use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::{
    routing::{get, post, put},
    Router,
};

use suzent_agent::pipeline::TurnContext;
use suzent_agent::provider::LlmProvider;
use suzent_agent::{AgentSessionManager, ChatRequest, StreamRegistry};
use suzent_channels::ChannelManager;
use suzent_chats::ChatStore;
use suzent_core::SuzentConfig;
use suzent_memory::{CompletionClient, MemoryError, MemoryManager};
use suzent_nodes::NodeManager;
use suzent_scheduler::{HeartbeatRunner, SchedulerBrain};

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: Arc<SuzentConfig>,
    pub chats: Arc<ChatStore>,
    pub memory: Option<Arc<MemoryManager>>,
    pub agents: AgentSessionManager,
    pub streams: StreamRegistry,
    pub nodes: Arc<NodeManager>,
    pub channels: Arc<ChannelManager>,
    /// LLM handle for compression summaries; shared with the extractor.
    pub summarizer: Option<Arc<dyn CompletionClient>>,
    /// Background subsystems hold Arc<AppState>, so they are attached after
    /// construction and live for the process lifetime.
    scheduler: OnceLock<Arc<SchedulerBrain<AppState>>>,
    heartbeat: OnceLock<Arc<HeartbeatRunner<AppState>>>,
}

impl AppState {
    pub fn new(
        config: Arc<SuzentConfig>,
        chats: Arc<ChatStore>,
        memory: Option<Arc<MemoryManager>>,
        agents: AgentSessionManager,
        nodes: Arc<NodeManager>,
        channels: Arc<ChannelManager>,
        summarizer: Option<Arc<dyn CompletionClient>>,
    ) -> Self {
        Self {
            config,
            chats,
            memory,
            agents,
            streams: StreamRegistry::new(),
            nodes,
            channels,
            summarizer,
            scheduler: OnceLock::new(),
            heartbeat: OnceLock::new(),
        }
    }

    pub fn attach_scheduler(&self, scheduler: Arc<SchedulerBrain<AppState>>) {
        let _ = self.scheduler.set(scheduler);
    }

    pub fn attach_heartbeat(&self, heartbeat: Arc<HeartbeatRunner<AppState>>) {
        let _ = self.heartbeat.set(heartbeat);
    }

    pub fn scheduler(&self) -> Option<&Arc<SchedulerBrain<AppState>>> {
        self.scheduler.get()
    }

    pub fn heartbeat(&self) -> Option<&Arc<HeartbeatRunner<AppState>>> {
        self.heartbeat.get()
    }
}

impl TurnContext for AppState {
    fn config(&self) -> &SuzentConfig {
        &self.config
    }

    fn chats(&self) -> &Arc<ChatStore> {
        &self.chats
    }

    fn memory(&self) -> Option<&Arc<MemoryManager>> {
        self.memory.as_ref()
    }

    fn agents(&self) -> &AgentSessionManager {
        &self.agents
    }

    fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    fn summarizer(&self) -> Option<Arc<dyn CompletionClient>> {
        self.summarizer.clone()
    }

    fn social_sender(&self) -> Option<Arc<dyn suzent_agent::tools::SocialSender>> {
        Some(Arc::clone(&self.channels) as Arc<dyn suzent_agent::tools::SocialSender>)
    }
}

/// Adapts an [`LlmProvider`] to the memory subsystem's completion seam,
/// pinning the model used for extraction and summaries.
pub struct ProviderCompletion {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl ProviderCompletion {
    pub fn new(provider: Arc<dyn LlmProvider>, model: String) -> Self {
        Self { provider, model }
    }
}

#[async_trait]
impl CompletionClient for ProviderCompletion {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, MemoryError> {
        let mut req = ChatRequest::simple(self.model.clone(), system, prompt.to_string());
        req.temperature = Some(temperature);
        let response = self
            .provider
            .send(&req)
            .await
            .map_err(|e| MemoryError::Extraction(e.to_string()))?;
        Ok(response.content)
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health))
        .route("/chat", post(crate::http::chat::chat))
        .route("/chat/stop", post(crate::http::chat::stop_chat))
        .route(
            "/chats",
            get(crate::http::chats::list_chats).post(crate::http::chats::create_chat),
        )
        .route(
            "/chats/{id}",
            get(crate::http::chats::get_chat)
                .put(crate::http::chats::update_chat)
                .delete(crate::http::chats::delete_chat),
        )
        .route("/chats/{id}/plan", get(crate::http::chats::get_plan))
        .route(
            "/preferences",
            get(crate::http::prefs::get_preferences).put(crate::http::prefs::save_preferences),
        )
        .route(
            "/mcp/servers",
            get(crate::http::prefs::list_mcp_servers).post(crate::http::prefs::save_mcp_server),
        )
        .route(
            "/mcp/servers/{name}",
            axum::routing::delete(crate::http::prefs::delete_mcp_server),
        )
        .route(
            "/mcp/servers/{name}/enabled",
            put(crate::http::prefs::set_mcp_server_enabled),
        )
        .route(
            "/memory/archival",
            get(crate::http::memory::search_archival),
        )
        .route(
            "/memory/core",
            get(crate::http::memory::get_core_memory).put(crate::http::memory::update_core_block),
        )
        .route("/memory/reindex", post(crate::http::memory::reindex))
        .route("/memory/stats", get(crate::http::memory::stats))
        .route("/memory/logs", get(crate::http::memory::list_daily_logs))
        .route("/memory/logs/{date}", get(crate::http::memory::get_daily_log))
        .route(
            "/memory/file",
            get(crate::http::memory::get_memory_file).put(crate::http::memory::save_memory_file),
        )
        .route(
            "/cron/jobs",
            get(crate::http::cron::list_jobs).post(crate::http::cron::create_job),
        )
        .route(
            "/cron/jobs/{id}",
            get(crate::http::cron::get_job)
                .put(crate::http::cron::update_job)
                .delete(crate::http::cron::delete_job),
        )
        .route("/cron/jobs/{id}/trigger", post(crate::http::cron::trigger_job))
        .route("/cron/jobs/{id}/runs", get(crate::http::cron::list_runs))
        .route(
            "/cron/notifications",
            get(crate::http::cron::drain_notifications),
        )
        .route("/cron/status", get(crate::http::cron::status))
        .route("/heartbeat/status", get(crate::http::heartbeat::status))
        .route("/heartbeat/enable", post(crate::http::heartbeat::enable))
        .route("/heartbeat/disable", post(crate::http::heartbeat::disable))
        .route("/heartbeat/trigger", post(crate::http::heartbeat::trigger))
        .route(
            "/heartbeat/md",
            get(crate::http::heartbeat::get_md).put(crate::http::heartbeat::save_md),
        )
        .route(
            "/heartbeat/interval",
            put(crate::http::heartbeat::set_interval),
        )
        .route("/nodes", get(crate::http::nodes::list_nodes))
        .route("/nodes/{id}", get(crate::http::nodes::describe_node))
        .route("/nodes/{id}/invoke", post(crate::http::nodes::invoke_node))
        .route("/ws/node", get(crate::http::nodes::node_ws))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
}
