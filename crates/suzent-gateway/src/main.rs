use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use suzent_agent::client::OpenAiCompatClient;
use suzent_agent::manager::ProviderFactory;
use suzent_agent::provider::LlmProvider;
use suzent_agent::AgentSessionManager;
use suzent_channels::{ChannelManager, SocialBrain};
use suzent_chats::ChatStore;
use suzent_core::config::{ModelConfig, PORT_FILE};
use suzent_core::SuzentConfig;
use suzent_memory::{
    CompletionClient, HashEmbedder, MarkdownMemoryStore, MemoryManager, VectorStore,
};
use suzent_nodes::{LocalNode, Node, NodeCapability, NodeManager};
use suzent_scheduler::{CronStore, HeartbeatRunner, SchedulerBrain};

use suzent_gateway::app::{self, AppState, ProviderCompletion};

#[derive(Parser)]
#[command(name = "suzent-gateway", about = "Suzent digital coworker server")]
struct Cli {
    /// Path to suzent.toml (default: $data_dir/suzent.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "suzent=info,suzent_gateway=info,tower_http=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = SuzentConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        SuzentConfig::default()
    });
    let config = Arc::new(config);

    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(config.shared_dir())?;

    // Chat store (chats, preferences, MCP servers, plans).
    let chats = Arc::new(ChatStore::new(rusqlite::Connection::open(
        config.database_path(),
    )?)?);

    // LLM provider factory — one OpenAI-compatible client per model entry.
    let provider_factory: ProviderFactory = Box::new(|model: &ModelConfig| {
        let api_key = std::env::var(&model.api_key_env).unwrap_or_default();
        Arc::new(OpenAiCompatClient::new(api_key, model.base_url.clone())) as Arc<dyn LlmProvider>
    });

    // Extraction/summary LLM, shared by the memory manager and compressor.
    let summarizer: Option<Arc<dyn CompletionClient>> = extraction_client(&config);

    // Memory subsystem: vector index + markdown store + embedder.
    let memory = if config.memory.enabled {
        let vector = Arc::new(VectorStore::open(&config.memory_index_dir())?);
        let markdown = Arc::new(MarkdownMemoryStore::new(config.markdown_memory_dir())?);
        let embedder = Arc::new(HashEmbedder::new(config.memory.embedding_dimension));
        Some(Arc::new(MemoryManager::new(
            vector,
            Some(markdown),
            embedder,
            summarizer.clone(),
        )))
    } else {
        info!("memory system disabled in configuration");
        None
    };

    // Node registry with the in-process local node.
    let nodes = Arc::new(NodeManager::new());
    nodes.register(Arc::new(build_local_node()) as Arc<dyn Node>);

    let channels = Arc::new(ChannelManager::new());

    let agents = AgentSessionManager::new(
        Arc::clone(&config),
        Arc::clone(&chats),
        memory.clone(),
        Arc::clone(&nodes),
        provider_factory,
    );

    let state = Arc::new(AppState::new(
        Arc::clone(&config),
        chats,
        memory,
        agents,
        nodes,
        Arc::clone(&channels),
        summarizer,
    ));

    // Background loops share one shutdown signal.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Scheduler — own connection to the shared database file.
    let cron_store = Arc::new(CronStore::new(rusqlite::Connection::open(
        config.database_path(),
    )?)?);
    let scheduler = Arc::new(SchedulerBrain::new(
        Arc::clone(&state),
        cron_store,
        config.scheduler.tick_secs,
    ));
    state.attach_scheduler(Arc::clone(&scheduler));
    tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx.clone()));

    // Heartbeat — alerts land in the scheduler's notification queue.
    let heartbeat = Arc::new(HeartbeatRunner::new(
        Arc::clone(&state),
        config.heartbeat.interval_minutes,
    ));
    {
        let scheduler = Arc::clone(&scheduler);
        heartbeat.set_notification_callback(Arc::new(move |alert: String| {
            scheduler.push_notification(suzent_scheduler::Notification {
                job_id: 0,
                job_name: "heartbeat".to_string(),
                result: alert.chars().take(500).collect(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            });
        }));
    }
    state.attach_heartbeat(Arc::clone(&heartbeat));
    HeartbeatRunner::start(&heartbeat);

    // Social fan-in: connect drivers and start the consumer loop.
    channels.connect_all().await;
    if let Some(inbound) = channels.take_receiver().await {
        let brain = Arc::new(SocialBrain::new(Arc::clone(&state), Arc::clone(&channels)));
        tokio::spawn(brain.run(inbound, shutdown_rx.clone()));
    }

    // Bind, record the effective port, serve.
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    std::fs::write(config.data_dir.join(PORT_FILE), local_addr.port().to_string())?;
    info!("suzent gateway listening on {local_addr}");

    let router = app::build_router(Arc::clone(&state));
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // Orderly teardown: stop loops, drain channels.
    let _ = shutdown_tx.send(true);
    heartbeat.disable();
    channels.disconnect_all().await;
    info!("suzent gateway stopped");
    Ok(())
}

/// Build the memory-extraction LLM client from config, when a model is set.
fn extraction_client(config: &SuzentConfig) -> Option<Arc<dyn CompletionClient>> {
    if config.memory.extraction_model.is_empty() {
        return None;
    }
    let model = config
        .agent
        .models
        .iter()
        .find(|m| m.id == config.memory.extraction_model)?;
    let api_key = std::env::var(&model.api_key_env).unwrap_or_default();
    let provider: Arc<dyn LlmProvider> =
        Arc::new(OpenAiCompatClient::new(api_key, model.base_url.clone()));
    Some(Arc::new(ProviderCompletion::new(
        provider,
        model.id.clone(),
    )))
}

/// In-process node exposing benign host capabilities. Hardware-backed
/// capabilities (speaker, camera) register here from platform integrations.
fn build_local_node() -> LocalNode {
    LocalNode::new("Local Host")
        .register(
            NodeCapability {
                name: "host.info".to_string(),
                description: "Report host OS and architecture".to_string(),
                params_schema: Default::default(),
            },
            |_params| async move {
                Ok(serde_json::json!({
                    "os": std::env::consts::OS,
                    "arch": std::env::consts::ARCH,
                }))
            },
        )
        .register(
            NodeCapability {
                name: "echo.test".to_string(),
                description: "Echo parameters back (connectivity check)".to_string(),
                params_schema: [("msg".to_string(), "str".to_string())].into_iter().collect(),
            },
            |params| async move { Ok(params) },
        )
}
