use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default identity for the single local operator.
pub const DEFAULT_USER_ID: &str = "default-user";
/// File written next to the database with the bound TCP port.
pub const PORT_FILE: &str = "server.port";

/// Top-level config (suzent.toml + SUZENT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuzentConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Data root. Overridden by SUZENT_APP_DATA (bundled mode).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for SuzentConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            agent: AgentConfig::default(),
            memory: MemoryConfig::default(),
            scheduler: SchedulerConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            channels: ChannelsConfig::default(),
            sandbox: SandboxConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port; 0 asks the OS for a free port (actual port lands in server.port).
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// One selectable LLM model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier sent to the provider (e.g. "gpt-4.1-mini").
    pub id: String,
    /// OpenAI-compatible base URL, no trailing slash.
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Configured model endpoints, first enabled entry is the fallback.
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    /// Default agent kind: "code" or "toolcalling".
    #[serde(default = "default_agent_kind")]
    pub kind: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Base instructions prepended to every agent's system prompt.
    #[serde(default)]
    pub instructions: String,
    /// Tools equipped when the user has no preference set.
    #[serde(default = "default_tools")]
    pub default_tools: Vec<String>,
    /// Names of skills available to the skill tool. Non-empty auto-equips it.
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_max_history_steps")]
    pub max_history_steps: usize,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            kind: default_agent_kind(),
            max_steps: default_max_steps(),
            instructions: String::new(),
            default_tools: default_tools(),
            skills: Vec::new(),
            max_history_steps: default_max_history_steps(),
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Model used for fact extraction and compression summaries.
    /// Empty string selects the deterministic heuristic extractor.
    #[serde(default)]
    pub extraction_model: String,
    /// Embedding dimension; 0 auto-detects from the first embedding.
    #[serde(default)]
    pub embedding_dimension: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extraction_model: String::new(),
            embedding_dimension: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_minutes")]
    pub interval_minutes: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_heartbeat_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    /// Senders allowed on every platform. Empty means open access.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Per-platform allowlists keyed by platform tag ("telegram", "slack", …).
    #[serde(default)]
    pub allowlists: std::collections::HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SandboxConfig {
    /// host:container volume mappings reported in the agent instructions.
    #[serde(default)]
    pub volumes: Vec<String>,
}

fn bool_true() -> bool {
    true
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_model_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_agent_kind() -> String {
    "code".to_string()
}
fn default_max_steps() -> u32 {
    10
}
fn default_tools() -> Vec<String> {
    vec!["planning".to_string()]
}
fn default_max_history_steps() -> usize {
    20
}
fn default_max_context_tokens() -> usize {
    100_000
}
fn default_tick_secs() -> u64 {
    30
}
fn default_heartbeat_minutes() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SUZENT_APP_DATA") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".suzent")
}

impl SuzentConfig {
    /// Load config from a TOML file with SUZENT_* env var overrides.
    ///
    /// Checks in order: explicit path, then `$data_dir/suzent.toml`.
    /// `SUZENT_HOST` and `SUZENT_PORT` always win over the file.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("suzent.toml"));

        let mut config: SuzentConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SUZENT_").split("__"))
            .extract()
            .map_err(|e| crate::error::SuzentError::Config(e.to_string()))?;

        if let Ok(host) = std::env::var("SUZENT_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("SUZENT_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| crate::error::SuzentError::Config(format!("invalid SUZENT_PORT: {port}")))?;
        }
        if let Ok(dir) = std::env::var("SUZENT_APP_DATA") {
            config.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Path of the SQLite database holding chats, preferences, and cron state.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("suzent.db")
    }

    /// Directory for the archival vector index.
    pub fn memory_index_dir(&self) -> PathBuf {
        self.data_dir.join("memory")
    }

    /// Shared workspace visible to the agent (markdown memory, HEARTBEAT.md).
    pub fn shared_dir(&self) -> PathBuf {
        self.data_dir.join("shared")
    }

    /// Directory where markdown memory files live.
    pub fn markdown_memory_dir(&self) -> PathBuf {
        self.shared_dir().join("memory")
    }

    /// Checklist file that gates the heartbeat loop.
    pub fn heartbeat_md_path(&self) -> PathBuf {
        self.shared_dir().join("HEARTBEAT.md")
    }

    /// Per-chat attachment directory.
    pub fn uploads_dir(&self, chat_id: &str) -> PathBuf {
        self.data_dir.join("uploads").join(chat_id)
    }

    /// Ids of all enabled models, config order preserved.
    pub fn enabled_models(&self) -> Vec<String> {
        self.agent
            .models
            .iter()
            .filter(|m| m.enabled)
            .map(|m| m.id.clone())
            .collect()
    }
}
