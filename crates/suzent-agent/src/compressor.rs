//! Context compression — summarize and prune old agent steps.
//!
//! When a chat's step log outgrows the configured window, the middle of the
//! history is flushed into long-term memory, summarized, and replaced with
//! a single synthetic archive step. Step 0 (the initial task) and the most
//! recent steps always survive.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use suzent_memory::types::ConversationTurn;
use suzent_memory::{CompletionClient, MemoryManager};

use crate::agent::Agent;
use crate::provider::ToolCall;
use crate::steps::{truncate, AgentMemory, MemoryStep, MAX_OUTPUT_CHARS};

pub const ARCHIVE_HEADER: &str = "--- ARCHIVED CONTEXT SUMMARY ---";
pub const ARCHIVE_FOOTER: &str = "--- END ARCHIVED CONTEXT ---";

const SUMMARY_SYSTEM: &str = "You are an expert technical summarizer.";

const SUMMARY_PROMPT: &str = "Summarize this segment of an AI agent's conversation history to \
free up context window space. Focus on key decisions, tool outputs, and facts learned; discard \
verbose logs and resolved intermediate errors. Write a concise past-tense account the agent can \
read to understand what happened.\n\
--------------------------------------------------\n\
{steps}\n\
--------------------------------------------------";

pub struct ContextCompressor {
    summarizer: Option<Arc<dyn CompletionClient>>,
    max_history_steps: usize,
    max_context_tokens: usize,
}

impl ContextCompressor {
    pub fn new(
        summarizer: Option<Arc<dyn CompletionClient>>,
        max_history_steps: usize,
        max_context_tokens: usize,
    ) -> Self {
        Self {
            summarizer,
            max_history_steps,
            max_context_tokens,
        }
    }

    /// Compress the agent's memory when it exceeds the window. Returns true
    /// when compression ran.
    ///
    /// Failures never propagate: an error leaves the memory untouched.
    pub async fn compress_if_needed(
        &self,
        agent: &mut Agent,
        chat_id: &str,
        user_id: &str,
        memory: Option<&Arc<MemoryManager>>,
    ) -> bool {
        let Some(reason) = self.should_compress(&agent.memory) else {
            return false;
        };
        info!(chat_id, reason, "compressing agent context");

        let steps = &agent.memory.steps;
        let keep_recent = std::cmp::max(5, self.max_history_steps / 4);
        if steps.len() <= keep_recent + 1 {
            debug!("not enough steps to compress effectively");
            return false;
        }

        let end = steps.len() - keep_recent;
        if end <= 1 {
            return false;
        }
        let window = steps[1..end].to_vec();

        // Pre-compaction flush: extract memories from what is about to be
        // discarded. Logged only; never blocks the compression.
        if let Some(memory) = memory {
            let turn = synthesize_turn(&window);
            if !turn.user_message.is_empty() || !turn.assistant_message.is_empty() {
                let outcome = memory.process_turn(&turn, chat_id, user_id).await;
                debug!(
                    flushed = outcome.memories_created.len(),
                    "pre-compaction memory flush"
                );
            }
        }

        let steps_text = AgentMemory::render_steps_text(&window);
        let summary = match self.summarize(&steps_text).await {
            Some(s) => s,
            None => {
                warn!(chat_id, "summary generation failed, skipping compression");
                return false;
            }
        };

        // Numbered like the first step it replaces, so the surviving recent
        // steps keep a monotone sequence.
        let archive_number = window
            .iter()
            .filter_map(|s| s.step_number())
            .next()
            .unwrap_or(0);
        let summary_step = MemoryStep::Action {
            step_number: archive_number,
            tool_calls: Some(vec![ToolCall {
                id: "context_compression_event".to_string(),
                name: "system_context_manager".to_string(),
                arguments: serde_json::json!({"action": "read_archived_history"}),
            }]),
            model_output: None,
            code_action: None,
            observations: None,
            action_output: Some(format!("{ARCHIVE_HEADER}\n{summary}\n{ARCHIVE_FOOTER}")),
            is_final_answer: false,
            error: None,
        };

        let before = agent.memory.len();
        let mut new_steps = vec![agent.memory.steps[0].clone(), summary_step];
        new_steps.extend_from_slice(&agent.memory.steps[end..]);
        agent.memory.steps = new_steps;

        info!(
            chat_id,
            before,
            after = agent.memory.len(),
            "context compressed"
        );
        true
    }

    fn should_compress(&self, memory: &AgentMemory) -> Option<String> {
        if memory.is_empty() {
            return None;
        }
        if memory.len() > self.max_history_steps {
            return Some(format!(
                "step count ({}) exceeds limit ({})",
                memory.len(),
                self.max_history_steps
            ));
        }
        // Rough estimate: 4 chars per token over the rendered history.
        let estimated_tokens = AgentMemory::render_steps_text(&memory.steps).len() / 4;
        if estimated_tokens > self.max_context_tokens {
            return Some(format!(
                "estimated tokens ({estimated_tokens}) exceed limit ({})",
                self.max_context_tokens
            ));
        }
        None
    }

    async fn summarize(&self, steps_text: &str) -> Option<String> {
        match self.summarizer {
            Some(ref llm) => {
                let prompt = SUMMARY_PROMPT.replace("{steps}", steps_text);
                match llm.complete(SUMMARY_SYSTEM, &prompt, 0.3).await {
                    Ok(summary) if !summary.trim().is_empty() => Some(summary.trim().to_string()),
                    Ok(_) => None,
                    Err(e) => {
                        error!(error = %e, "summary LLM call failed");
                        None
                    }
                }
            }
            // No summarizer configured: fall back to the truncated raw
            // rendering so compression still converges.
            None => Some(truncate(steps_text, MAX_OUTPUT_CHARS)),
        }
    }
}

/// Build a ConversationTurn from a step window about to be discarded.
///
/// Task steps become user fragments; action outputs and final answers become
/// assistant fragments; tool calls map to actions and plans to reasoning.
fn synthesize_turn(window: &[MemoryStep]) -> ConversationTurn {
    let mut user_parts = Vec::new();
    let mut assistant_parts = Vec::new();
    let mut actions = Vec::new();
    let mut reasoning = Vec::new();

    for step in window {
        match step {
            MemoryStep::Task { task } => user_parts.push(task.clone()),
            MemoryStep::Planning { plan } => reasoning.push(plan.clone()),
            MemoryStep::Action {
                tool_calls,
                action_output,
                ..
            } => {
                if let Some(calls) = tool_calls {
                    for call in calls {
                        actions.push(format!("{}({})", call.name, call.arguments));
                    }
                }
                if let Some(output) = action_output {
                    assistant_parts.push(truncate(output, 500));
                }
            }
            MemoryStep::FinalAnswer { output } => {
                if let Some(output) = output {
                    assistant_parts.push(output.clone());
                }
            }
            MemoryStep::Unknown { .. } => {}
        }
    }

    ConversationTurn {
        user_message: user_parts.join("\n"),
        assistant_message: assistant_parts.join("\n"),
        agent_actions: actions,
        agent_reasoning: reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::ScriptedProvider;
    use crate::agent::AgentKind;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use suzent_memory::{HashEmbedder, MarkdownMemoryStore, VectorStore};

    struct FixedSummarizer;

    #[async_trait]
    impl CompletionClient for FixedSummarizer {
        async fn complete(
            &self,
            _system: &str,
            _prompt: &str,
            _temperature: f32,
        ) -> Result<String, suzent_memory::MemoryError> {
            Ok("The agent investigated and resolved the task.".to_string())
        }
    }

    fn agent_with_steps(n: usize) -> Agent {
        let mut agent = Agent::new(
            "m1".to_string(),
            AgentKind::Code,
            String::new(),
            10,
            vec![],
            Arc::new(ScriptedProvider::new(vec![])),
        );
        agent.memory.push(MemoryStep::Task {
            task: "original task".to_string(),
        });
        for i in 1..n {
            agent.memory.push(MemoryStep::Action {
                step_number: i as u32,
                tool_calls: None,
                model_output: Some(format!("thinking {i}")),
                code_action: None,
                observations: None,
                action_output: Some(format!("result {i}")),
                is_final_answer: false,
                error: None,
            });
        }
        agent.step_number = n as u32;
        agent
    }

    fn compressor(max_steps: usize) -> ContextCompressor {
        ContextCompressor::new(Some(Arc::new(FixedSummarizer)), max_steps, 1_000_000)
    }

    #[tokio::test]
    async fn below_threshold_is_untouched() {
        let mut agent = agent_with_steps(5);
        let ran = compressor(20)
            .compress_if_needed(&mut agent, "c1", "u1", None)
            .await;
        assert!(!ran);
        assert_eq!(agent.memory.len(), 5);
    }

    #[tokio::test]
    async fn compression_preserves_anchor_and_recent_window() {
        let mut agent = agent_with_steps(30);
        let ran = compressor(20)
            .compress_if_needed(&mut agent, "c1", "u1", None)
            .await;
        assert!(ran);

        // step 0 preserved
        assert!(matches!(
            agent.memory.steps[0],
            MemoryStep::Task { ref task } if task == "original task"
        ));
        // exactly one synthetic archive step
        let archive_count = agent
            .memory
            .steps
            .iter()
            .filter(|s| matches!(s, MemoryStep::Action { action_output: Some(o), .. } if o.contains("ARCHIVED CONTEXT SUMMARY")))
            .count();
        assert_eq!(archive_count, 1);
        // total: task + summary + keep_recent(5) = 7
        assert_eq!(agent.memory.len(), 7);
        // last original step is intact
        assert!(matches!(
            agent.memory.steps.last().unwrap(),
            MemoryStep::Action { action_output: Some(o), .. } if o == "result 29"
        ));
    }

    #[tokio::test]
    async fn compression_is_a_contraction() {
        for n in [10, 25, 40] {
            let mut agent = agent_with_steps(n);
            let before = agent.memory.len();
            compressor(20)
                .compress_if_needed(&mut agent, "c1", "u1", None)
                .await;
            assert!(agent.memory.len() <= before);
        }
    }

    #[tokio::test]
    async fn token_threshold_triggers_compression() {
        let mut agent = agent_with_steps(10);
        let c = ContextCompressor::new(Some(Arc::new(FixedSummarizer)), 100, 10);
        let ran = c.compress_if_needed(&mut agent, "c1", "u1", None).await;
        assert!(ran);
    }

    #[tokio::test]
    async fn pre_compaction_flush_writes_memories() {
        let dir = tempfile::tempdir().unwrap();
        let vector = Arc::new(VectorStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let markdown = Arc::new(MarkdownMemoryStore::new(dir.path()).unwrap());
        let memory = Arc::new(suzent_memory::MemoryManager::new(
            Arc::clone(&vector),
            Some(markdown),
            Arc::new(HashEmbedder::default()),
            None,
        ));

        let mut agent = agent_with_steps(30);
        // Plant an extractable statement in the to-compress window.
        agent.memory.steps[2] = MemoryStep::Task {
            task: "My name is Ada and I work on compilers.".to_string(),
        };

        compressor(20)
            .compress_if_needed(&mut agent, "c1", "u1", Some(&memory))
            .await;

        assert!(vector.stats().unwrap().total_memories >= 1);
    }

    #[tokio::test]
    async fn no_summarizer_still_contracts() {
        let mut agent = agent_with_steps(30);
        let c = ContextCompressor::new(None, 20, 1_000_000);
        let ran = c.compress_if_needed(&mut agent, "c1", "u1", None).await;
        assert!(ran);
        assert_eq!(agent.memory.len(), 7);
    }

    #[test]
    fn synthesized_turn_collects_fragments() {
        let window = vec![
            MemoryStep::Task {
                task: "user asked something".to_string(),
            },
            MemoryStep::Planning {
                plan: "plan it".to_string(),
            },
            MemoryStep::Action {
                step_number: 1,
                tool_calls: Some(vec![ToolCall {
                    id: "1".to_string(),
                    name: "echo".to_string(),
                    arguments: serde_json::json!({}),
                }]),
                model_output: None,
                code_action: None,
                observations: None,
                action_output: Some("echoed".to_string()),
                is_final_answer: false,
                error: None,
            },
            MemoryStep::FinalAnswer {
                output: Some("answered".to_string()),
            },
        ];
        let turn = synthesize_turn(&window);
        assert_eq!(turn.user_message, "user asked something");
        assert!(turn.assistant_message.contains("echoed"));
        assert!(turn.assistant_message.contains("answered"));
        assert_eq!(turn.agent_actions.len(), 1);
        assert_eq!(turn.agent_reasoning, vec!["plan it"]);
    }
}
