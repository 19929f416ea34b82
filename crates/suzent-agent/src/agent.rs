//! The agent loop: provider → tool calls → tool results → provider, until a
//! final answer, the step budget, or cancellation.
//!
//! Each iteration emits the §streaming event kinds through an mpsc channel;
//! the memory step log records what happened for persistence and later
//! compression. The cancel token is checked at every suspension point.

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::AgentEvent;
use crate::provider::{ChatRequest, LlmProvider, Message, Role, ToolCall};
use crate::steps::{truncate, AgentMemory, MemoryStep, MAX_OBSERVATION_CHARS, MAX_OUTPUT_CHARS};
use crate::tools::{Tool, ToolResult, TurnRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Code,
    ToolCalling,
}

impl FromStr for AgentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "code" | "CodeAgent" => Ok(AgentKind::Code),
            "toolcalling" | "ToolcallingAgent" => Ok(AgentKind::ToolCalling),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct Agent {
    pub model_id: String,
    pub kind: AgentKind,
    pub instructions: String,
    pub max_steps: u32,
    pub step_number: u32,
    pub memory: AgentMemory,
    pub tools: Vec<Arc<dyn Tool>>,
    provider: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("model_id", &self.model_id)
            .field("kind", &self.kind)
            .field("instructions", &self.instructions)
            .field("max_steps", &self.max_steps)
            .field("step_number", &self.step_number)
            .field("memory", &self.memory)
            .field("tools_count", &self.tools.len())
            .finish()
    }
}

impl Agent {
    pub fn new(
        model_id: String,
        kind: AgentKind,
        instructions: String,
        max_steps: u32,
        tools: Vec<Arc<dyn Tool>>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            model_id,
            kind,
            instructions,
            max_steps,
            step_number: 1,
            memory: AgentMemory::default(),
            tools,
            provider,
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for tool in &self.tools {
            let name = tool.name().to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Hand the current turn's runtime handles to every stateful tool.
    pub fn inject_context(&self, runtime: &TurnRuntime) {
        for tool in &self.tools {
            tool.inject_context(runtime);
        }
    }

    /// Run one turn. Events stream through `events`; the final answer (when
    /// produced) is both emitted as an event and returned.
    ///
    /// Cancellation: checked before each provider call and each tool
    /// execution. On cancel the loop stops emitting and returns `None`.
    pub async fn run(
        &mut self,
        task: &str,
        images: Vec<String>,
        cancel: CancellationToken,
        events: mpsc::Sender<AgentEvent>,
    ) -> Option<String> {
        self.memory.push(MemoryStep::Task {
            task: task.to_string(),
        });

        for iteration in 0..self.max_steps {
            if cancel.is_cancelled() {
                info!(iteration, "agent run cancelled");
                return None;
            }

            let request = self.build_request(&images);
            debug!(iteration, model = %request.model, "agent loop iteration");

            let response = tokio::select! {
                r = self.provider.send(&request) => r,
                _ = cancel.cancelled() => {
                    info!(iteration, "agent run cancelled during provider call");
                    return None;
                }
            };

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "provider call failed");
                    let _ = events.send(AgentEvent::Error(e.to_string())).await;
                    self.memory.push(MemoryStep::Action {
                        step_number: self.step_number,
                        tool_calls: None,
                        model_output: None,
                        code_action: None,
                        observations: None,
                        action_output: None,
                        is_final_answer: false,
                        error: Some(e.to_string()),
                    });
                    self.step_number += 1;
                    return None;
                }
            };

            if !response.content.is_empty() {
                if events
                    .send(AgentEvent::StreamDelta(response.content.clone()))
                    .await
                    .is_err()
                {
                    // Receiver gone — the client went away; stop producing.
                    return None;
                }
            }

            if response.tool_calls.is_empty() {
                // No tools requested: this is the final answer.
                let answer = response.content.clone();
                let _ = events.send(AgentEvent::FinalAnswer(answer.clone())).await;
                self.memory.push(MemoryStep::FinalAnswer {
                    output: Some(truncate(&answer, MAX_OUTPUT_CHARS)),
                });
                return Some(answer);
            }

            // Execute each requested tool, collecting observations.
            let mut observations = Vec::new();
            for call in &response.tool_calls {
                if cancel.is_cancelled() {
                    info!("agent run cancelled before tool execution");
                    return None;
                }
                let result = self.execute_tool(call).await;
                let _ = events
                    .send(AgentEvent::Action {
                        tool: call.name.clone(),
                        output: truncate(&result.content, 500),
                    })
                    .await;
                observations.push(format!("[{}] {}", call.name, result.content));
            }

            let joined = truncate(&observations.join("\n"), MAX_OBSERVATION_CHARS);
            let _ = events.send(AgentEvent::ActionOutput(joined.clone())).await;

            self.memory.push(MemoryStep::Action {
                step_number: self.step_number,
                tool_calls: Some(response.tool_calls.clone()),
                model_output: if response.content.is_empty() {
                    None
                } else {
                    Some(response.content.clone())
                },
                code_action: None,
                observations: Some(joined),
                action_output: None,
                is_final_answer: false,
                error: None,
            });
            self.step_number += 1;
        }

        warn!(max_steps = self.max_steps, "agent hit the step budget");
        let _ = events
            .send(AgentEvent::Error(format!(
                "agent stopped after {} steps without a final answer",
                self.max_steps
            )))
            .await;
        None
    }

    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        match self.tools.iter().find(|t| t.name() == call.name) {
            Some(tool) => {
                debug!(tool = %call.name, "executing tool");
                tool.execute(call.arguments.clone()).await
            }
            None => ToolResult::error(format!("unknown tool: {}", call.name)),
        }
    }

    /// Render the step log into a chat request.
    fn build_request(&self, images: &[String]) -> ChatRequest {
        let mut messages = Vec::new();
        for step in &self.memory.steps {
            match step {
                MemoryStep::Task { task } => messages.push(Message {
                    role: Role::User,
                    content: task.clone(),
                }),
                MemoryStep::Planning { plan } => messages.push(Message {
                    role: Role::Assistant,
                    content: format!("Plan: {plan}"),
                }),
                MemoryStep::Action {
                    tool_calls,
                    model_output,
                    observations,
                    action_output,
                    ..
                } => {
                    let mut assistant = String::new();
                    if let Some(output) = model_output {
                        assistant.push_str(output);
                    }
                    if let Some(calls) = tool_calls {
                        for call in calls {
                            assistant.push_str(&format!(
                                "\n[called {}({})]",
                                call.name, call.arguments
                            ));
                        }
                    }
                    if let Some(output) = action_output {
                        assistant.push_str(output);
                    }
                    if !assistant.is_empty() {
                        messages.push(Message {
                            role: Role::Assistant,
                            content: assistant,
                        });
                    }
                    if let Some(obs) = observations {
                        messages.push(Message {
                            role: Role::User,
                            content: format!("Tool results:\n{obs}"),
                        });
                    }
                }
                MemoryStep::FinalAnswer { output } => {
                    if let Some(output) = output {
                        messages.push(Message {
                            role: Role::Assistant,
                            content: output.clone(),
                        });
                    }
                }
                MemoryStep::Unknown { .. } => {}
            }
        }

        ChatRequest {
            model: self.model_id.clone(),
            system: self.instructions.clone(),
            messages,
            max_tokens: 4096,
            temperature: None,
            tools: crate::tools::to_definitions(&self.tools),
            images: images.to_vec(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall};

    /// Provider that replays a scripted sequence of responses.
    pub struct ScriptedProvider {
        responses: Vec<ChatResponse>,
        cursor: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses,
                cursor: AtomicUsize::new(0),
            }
        }

        pub fn final_answer(text: &str) -> ChatResponse {
            ChatResponse {
                content: text.to_string(),
                model: "scripted".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
                tool_calls: vec![],
            }
        }

        pub fn tool_call(tool: &str, arguments: serde_json::Value) -> ChatResponse {
            ChatResponse {
                content: String::new(),
                model: "scripted".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "tool_use".to_string(),
                tool_calls: vec![ToolCall {
                    id: "tc-1".to_string(),
                    name: tool.to_string(),
                    arguments,
                }],
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let i = self.cursor.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(i)
                .or_else(|| self.responses.last())
                .cloned()
                .ok_or_else(|| ProviderError::Parse("scripted provider is empty".to_string()))
        }
    }
}
