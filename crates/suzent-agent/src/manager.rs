//! Agent session manager — builds agents from config and caches the result.
//!
//! A process-wide singleton `{agent, fingerprint}` lives behind one async
//! mutex. The fingerprint ignores transient per-request keys, so only a
//! real configuration change (or an explicit reset) rebuilds the agent.
//! Callers receive a clone; conversation state flows through the chat
//! store, never through the cache.

use std::str::FromStr;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use suzent_chats::types::McpServer;
use suzent_chats::ChatStore;
use suzent_core::config::ModelConfig;
use suzent_core::{SuzentConfig, SuzentError};
use suzent_memory::MemoryManager;
use suzent_nodes::NodeManager;

use crate::agent::{Agent, AgentKind};
use crate::prompts::{compose_instructions, SocialContext};
use crate::provider::LlmProvider;
use crate::tools::memory::{CoreMemoryUpdateTool, MemorySearchTool};
use crate::tools::node::NodeInvokeTool;
use crate::tools::planning::PlanningTool;
use crate::tools::skill::SkillTool;
use crate::tools::social::SocialMessageTool;
use crate::tools::Tool;

/// Config keys that never trigger an agent rebuild.
const TRANSIENT_KEYS: &[&str] = &["_runtime", "_chat_id", "_user_id"];

pub type ProviderFactory = Box<dyn Fn(&ModelConfig) -> Arc<dyn LlmProvider> + Send + Sync>;
pub type McpToolsetResolver = Box<dyn Fn(&[McpServer]) -> Vec<Arc<dyn Tool>> + Send + Sync>;

struct CachedAgent {
    agent: Agent,
    fingerprint: String,
}

pub struct AgentSessionManager {
    config: Arc<SuzentConfig>,
    chats: Arc<ChatStore>,
    memory: Option<Arc<MemoryManager>>,
    nodes: Arc<NodeManager>,
    provider_factory: ProviderFactory,
    mcp_resolver: McpToolsetResolver,
    cached: Mutex<Option<CachedAgent>>,
}

impl AgentSessionManager {
    pub fn new(
        config: Arc<SuzentConfig>,
        chats: Arc<ChatStore>,
        memory: Option<Arc<MemoryManager>>,
        nodes: Arc<NodeManager>,
        provider_factory: ProviderFactory,
    ) -> Self {
        Self {
            config,
            chats,
            memory,
            nodes,
            provider_factory,
            // Default resolver: MCP transport is a collaborator; without one
            // wired in, enabled endpoints contribute no tools.
            mcp_resolver: Box::new(|servers| {
                if !servers.is_empty() {
                    tracing::debug!(count = servers.len(), "no MCP resolver wired; endpoints skipped");
                }
                Vec::new()
            }),
            cached: Mutex::new(None),
        }
    }

    pub fn with_mcp_resolver(mut self, resolver: McpToolsetResolver) -> Self {
        self.mcp_resolver = resolver;
        self
    }

    /// Return the cached agent when the config fingerprint matches, or build
    /// (and cache) a new one.
    pub async fn get_or_create(
        &self,
        config: &serde_json::Value,
        reset: bool,
    ) -> Result<Agent, SuzentError> {
        let fp = fingerprint(config);
        let mut cached = self.cached.lock().await;

        if !reset {
            if let Some(entry) = cached.as_ref() {
                if entry.fingerprint == fp {
                    return Ok(entry.agent.clone());
                }
                info!("agent config changed, rebuilding agent");
            }
        }

        let memory_context = self.fetch_memory_context(config).await;
        let agent = self.build(config, memory_context.as_deref())?;
        *cached = Some(CachedAgent {
            agent: agent.clone(),
            fingerprint: fp,
        });
        Ok(agent)
    }

    async fn fetch_memory_context(&self, config: &serde_json::Value) -> Option<String> {
        let memory_enabled = config
            .get("memory_enabled")
            .and_then(|m| m.as_bool())
            .unwrap_or(self.config.memory.enabled);
        let manager = self.memory.as_ref()?;
        if !memory_enabled {
            return None;
        }
        let user_id = config
            .get("_user_id")
            .and_then(|u| u.as_str())
            .unwrap_or(suzent_core::config::DEFAULT_USER_ID);
        match manager.format_core_memory_for_context(user_id) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(error = %e, "core memory fetch failed");
                None
            }
        }
    }

    /// Build a fresh agent from config.
    pub fn build(
        &self,
        config: &serde_json::Value,
        memory_context: Option<&str>,
    ) -> Result<Agent, SuzentError> {
        // Model resolution against the enabled set.
        let enabled: Vec<&ModelConfig> = self
            .config
            .agent
            .models
            .iter()
            .filter(|m| m.enabled)
            .collect();
        if enabled.is_empty() {
            return Err(SuzentError::NoModelConfigured);
        }

        let requested = config.get("model").and_then(|m| m.as_str());
        let model = match requested.and_then(|id| enabled.iter().find(|m| m.id == id)) {
            Some(m) => m,
            None => {
                let fallback = enabled[0];
                if let Some(id) = requested {
                    warn!(
                        requested = id,
                        fallback = %fallback.id,
                        "requested model is not enabled, falling back"
                    );
                }
                fallback
            }
        };

        // Agent kind.
        let kind_str = config
            .get("agent")
            .and_then(|a| a.as_str())
            .unwrap_or(&self.config.agent.kind);
        let kind = AgentKind::from_str(kind_str)
            .map_err(|_| SuzentError::UnknownAgentType(kind_str.to_string()))?;

        let social_context: Option<SocialContext> = config
            .get("social_context")
            .and_then(|s| serde_json::from_value(s.clone()).ok());
        let memory_enabled = config
            .get("memory_enabled")
            .and_then(|m| m.as_bool())
            .unwrap_or(self.config.memory.enabled);

        let tools = self.build_tools(config, memory_enabled, social_context.is_some());

        let base_instructions = config
            .get("instructions")
            .and_then(|i| i.as_str())
            .unwrap_or(&self.config.agent.instructions);
        let instructions = compose_instructions(
            base_instructions,
            memory_context,
            &self.config.sandbox.volumes,
            social_context.as_ref(),
        );

        let provider = (self.provider_factory)(model);
        Ok(Agent::new(
            model.id.clone(),
            kind,
            instructions,
            self.config.agent.max_steps,
            tools,
            provider,
        ))
    }

    /// Union of user-requested tools and the auto-equipped set.
    ///
    /// Auto-equip rules: memory on → memory tools; social context → social
    /// message tool; configured skills → skill tool. The node tool rides
    /// along whenever nodes can be connected (always, for the local node).
    fn build_tools(
        &self,
        config: &serde_json::Value,
        memory_enabled: bool,
        social: bool,
    ) -> Vec<Arc<dyn Tool>> {
        let requested: Vec<String> = config
            .get("tools")
            .and_then(|t| t.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_else(|| self.config.agent.default_tools.clone());

        let auto_equipped = [
            "memory_search",
            "core_memory_update",
            "social_message",
            "skill",
        ];

        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        for name in &requested {
            if auto_equipped.contains(&name.as_str()) {
                continue;
            }
            match name.as_str() {
                "planning" => tools.push(Arc::new(PlanningTool::new(Arc::clone(&self.chats)))),
                "node_invoke" => tools.push(Arc::new(NodeInvokeTool::new(Arc::clone(&self.nodes)))),
                other => warn!(tool = other, "tool not found in registry, skipped"),
            }
        }

        if !tools.iter().any(|t| t.name() == "node_invoke") {
            tools.push(Arc::new(NodeInvokeTool::new(Arc::clone(&self.nodes))));
        }

        if memory_enabled {
            if let Some(ref memory) = self.memory {
                tools.push(Arc::new(MemorySearchTool::new(Arc::clone(memory))));
                tools.push(Arc::new(CoreMemoryUpdateTool::new(Arc::clone(memory))));
            }
        }

        if social || requested.iter().any(|t| t == "social_message") {
            tools.push(Arc::new(SocialMessageTool::new()));
        }

        if !self.config.agent.skills.is_empty() {
            tools.push(Arc::new(SkillTool::new(
                self.config.data_dir.join("skills"),
                self.config.agent.skills.clone(),
            )));
        }

        let enabled_mcp: Vec<McpServer> = self
            .chats
            .list_mcp_servers()
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.enabled)
            .collect();
        if !enabled_mcp.is_empty() {
            tools.extend((self.mcp_resolver)(&enabled_mcp));
        }

        tools
    }
}

/// SHA-256 fingerprint over the canonical JSON of the config with transient
/// keys removed. Stable under key reordering.
pub fn fingerprint(config: &serde_json::Value) -> String {
    let stable = strip_transient(config);
    let canonical = canonicalize(&stable);
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn strip_transient(config: &serde_json::Value) -> serde_json::Value {
    match config {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .filter(|(k, _)| !TRANSIENT_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Rebuild a value with recursively sorted object keys.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            serde_json::to_value(sorted).unwrap_or(serde_json::Value::Null)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::ScriptedProvider;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_config(models: Vec<ModelConfig>) -> Arc<SuzentConfig> {
        let mut config = SuzentConfig::default();
        config.agent.models = models;
        Arc::new(config)
    }

    fn model(id: &str, enabled: bool) -> ModelConfig {
        ModelConfig {
            id: id.to_string(),
            base_url: "http://localhost".to_string(),
            api_key_env: "TEST_KEY".to_string(),
            enabled,
        }
    }

    fn manager_with(models: Vec<ModelConfig>) -> (AgentSessionManager, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let factory: ProviderFactory = Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(ScriptedProvider::new(vec![]))
        });
        let chats = Arc::new(ChatStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let mgr = AgentSessionManager::new(
            test_config(models),
            chats,
            None,
            Arc::new(NodeManager::new()),
            factory,
        );
        (mgr, builds)
    }

    #[test]
    fn fingerprint_ignores_transient_keys() {
        let a = serde_json::json!({"model": "m1", "_chat_id": "c1", "_user_id": "u1"});
        let b = serde_json::json!({"model": "m1", "_chat_id": "c2", "_runtime": {"x": 1}});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_stable_under_key_order() {
        let a: serde_json::Value =
            serde_json::from_str(r#"{"model": "m1", "tools": ["planning"]}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"tools": ["planning"], "model": "m1"}"#).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_on_real_keys() {
        let a = serde_json::json!({"model": "m1"});
        let b = serde_json::json!({"model": "m2"});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[tokio::test]
    async fn cache_hit_skips_rebuild() {
        let (mgr, builds) = manager_with(vec![model("m1", true)]);
        let config = serde_json::json!({"model": "m1", "_chat_id": "c1"});

        mgr.get_or_create(&config, false).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        // Different transient key, same fingerprint — cached.
        let config2 = serde_json::json!({"model": "m1", "_chat_id": "c2"});
        mgr.get_or_create(&config2, false).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        // Reset forces a rebuild.
        mgr.get_or_create(&config2, true).await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn config_change_rebuilds() {
        let (mgr, builds) = manager_with(vec![model("m1", true), model("m2", true)]);
        mgr.get_or_create(&serde_json::json!({"model": "m1"}), false)
            .await
            .unwrap();
        mgr.get_or_create(&serde_json::json!({"model": "m2"}), false)
            .await
            .unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_enabled_models_fails() {
        let (mgr, _) = manager_with(vec![model("m1", false)]);
        let err = mgr
            .get_or_create(&serde_json::json!({}), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SuzentError::NoModelConfigured));
        assert_eq!(err.http_status(), 503);
    }

    #[tokio::test]
    async fn unknown_model_falls_back_to_first_enabled() {
        let (mgr, _) = manager_with(vec![model("m1", true)]);
        let agent = mgr
            .get_or_create(&serde_json::json!({"model": "nope"}), false)
            .await
            .unwrap();
        assert_eq!(agent.model_id, "m1");
    }

    #[tokio::test]
    async fn unknown_agent_kind_fails() {
        let (mgr, _) = manager_with(vec![model("m1", true)]);
        let err = mgr
            .get_or_create(&serde_json::json!({"agent": "QuantumAgent"}), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SuzentError::UnknownAgentType(_)));
    }

    #[tokio::test]
    async fn social_context_equips_social_tool() {
        let (mgr, _) = manager_with(vec![model("m1", true)]);
        let config = serde_json::json!({
            "social_context": {"platform": "telegram", "target_id": "42"}
        });
        let agent = mgr.get_or_create(&config, false).await.unwrap();
        assert!(agent.tool_names().contains(&"social_message".to_string()));
    }
}
