//! Agent memory steps — the tagged-variant record of everything an agent
//! has done in a chat. Serialized by [`crate::codec`], summarized by
//! [`crate::compressor`].

use serde::{Deserialize, Serialize};

use crate::provider::ToolCall;

/// Observations stored on a step are capped at this many characters.
pub const MAX_OBSERVATION_CHARS: usize = 4000;
/// Action and final-answer outputs are capped at this many characters.
pub const MAX_OUTPUT_CHARS: usize = 2000;
/// Unknown step reprs are capped at this many characters.
pub const MAX_REPR_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryStep {
    Task {
        task: String,
    },
    Planning {
        plan: String,
    },
    Action {
        step_number: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_output: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code_action: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        observations: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action_output: Option<String>,
        #[serde(default)]
        is_final_answer: bool,
        /// Transient error detail; cleared before encoding.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    FinalAnswer {
        output: Option<String>,
    },
    /// Step kinds this build does not know. Round-trips untouched.
    Unknown {
        repr: String,
    },
}

impl MemoryStep {
    pub fn step_number(&self) -> Option<u32> {
        match self {
            MemoryStep::Action { step_number, .. } => Some(*step_number),
            _ => None,
        }
    }
}

/// Ordered step log carried by an [`Agent`](crate::agent::Agent).
#[derive(Debug, Clone, Default)]
pub struct AgentMemory {
    pub steps: Vec<MemoryStep>,
}

impl AgentMemory {
    pub fn push(&mut self, step: MemoryStep) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Compact (actions, reasoning) view for memory extraction.
    pub fn succinct_steps(&self) -> (Vec<String>, Vec<String>) {
        let mut actions = Vec::new();
        let mut reasoning = Vec::new();
        for step in &self.steps {
            match step {
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
                        actions.push(truncate(output, 200));
                    }
                }
                MemoryStep::Planning { plan } => reasoning.push(truncate(plan, 400)),
                _ => {}
            }
        }
        (actions, reasoning)
    }

    /// Render a step range to text for summarization.
    pub fn render_steps_text(steps: &[MemoryStep]) -> String {
        let mut text = Vec::new();
        for step in steps {
            match step {
                MemoryStep::Task { task } => text.push(format!("Task: {task}")),
                MemoryStep::Planning { plan } => text.push(format!("Plan: {plan}")),
                MemoryStep::Action {
                    tool_calls,
                    action_output,
                    error,
                    ..
                } => {
                    if let Some(calls) = tool_calls {
                        for call in calls {
                            text.push(format!("Action: {}({})", call.name, call.arguments));
                        }
                    }
                    if let Some(output) = action_output {
                        text.push(format!("Result: {}", truncate(output, 500)));
                    }
                    if let Some(err) = error {
                        text.push(format!("Error: {err}"));
                    }
                }
                MemoryStep::FinalAnswer { output } => {
                    if let Some(output) = output {
                        text.push(format!("Final Answer: {}", truncate(output, 500)));
                    }
                }
                MemoryStep::Unknown { .. } => {}
            }
        }
        text.join("\n")
    }
}

/// Truncate on a char boundary, appending a marker when content was cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{cut}… (truncated)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_serializes_with_type_tag() {
        let step = MemoryStep::Task {
            task: "say hi".to_string(),
        };
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains(r#""type":"task""#));

        let back: MemoryStep = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, MemoryStep::Task { .. }));
    }

    #[test]
    fn action_skips_empty_optionals() {
        let step = MemoryStep::Action {
            step_number: 1,
            tool_calls: None,
            model_output: None,
            code_action: None,
            observations: None,
            action_output: Some("done".to_string()),
            is_final_answer: false,
            error: None,
        };
        let json = serde_json::to_string(&step).unwrap();
        assert!(!json.contains("observations"));
        assert!(!json.contains("error"));
        assert!(json.contains(r#""action_output":"done""#));
    }

    #[test]
    fn succinct_steps_collects_actions_and_plans() {
        let mut memory = AgentMemory::default();
        memory.push(MemoryStep::Task {
            task: "t".to_string(),
        });
        memory.push(MemoryStep::Planning {
            plan: "think first".to_string(),
        });
        memory.push(MemoryStep::Action {
            step_number: 1,
            tool_calls: Some(vec![ToolCall {
                id: "1".to_string(),
                name: "planning".to_string(),
                arguments: serde_json::json!({"content": "x"}),
            }]),
            model_output: None,
            code_action: None,
            observations: None,
            action_output: Some("plan saved".to_string()),
            is_final_answer: false,
            error: None,
        });

        let (actions, reasoning) = memory.succinct_steps();
        assert_eq!(actions.len(), 2);
        assert_eq!(reasoning, vec!["think first"]);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "ééééé";
        let t = truncate(s, 3);
        assert!(t.starts_with("ééé"));
        assert!(t.ends_with("(truncated)"));
        assert_eq!(truncate("short", 10), "short");
    }
}
