//! Agent state codec — versioned JSON serialization of agent memory.
//!
//! Format v2 is a human-inspectable JSON document with a tagged `steps`
//! array. Decoding is deliberately forgiving: unknown step kinds become
//! `unknown` records, legacy unversioned blobs are mapped forward when
//! their step layout is recognizable, and anything undecodable yields
//! `None` so the turn proceeds with a fresh agent instead of crashing.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::steps::{
    truncate, MemoryStep, MAX_OBSERVATION_CHARS, MAX_OUTPUT_CHARS, MAX_REPR_CHARS,
};

pub const STATE_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct AgentStateDoc {
    version: u32,
    model_id: Option<String>,
    instructions: Option<String>,
    step_number: u32,
    max_steps: u32,
    tool_names: Vec<String>,
    steps: Vec<serde_json::Value>,
}

/// Serialize agent state to JSON v2 bytes.
///
/// Mutable error fields are cleared and oversized text is truncated before
/// encoding; a step that still refuses to serialize is skipped rather than
/// failing the whole document.
pub fn encode_agent(agent: &Agent) -> Option<Vec<u8>> {
    let steps: Vec<serde_json::Value> = agent
        .memory
        .steps
        .iter()
        .filter_map(|step| serde_json::to_value(sanitize_step(step.clone())).ok())
        .collect();

    let doc = AgentStateDoc {
        version: STATE_FORMAT_VERSION,
        model_id: Some(agent.model_id.clone()),
        instructions: Some(agent.instructions.clone()),
        step_number: agent.step_number,
        max_steps: agent.max_steps,
        tool_names: agent.tool_names(),
        steps,
    };

    match serde_json::to_vec(&doc) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(error = %e, "agent state encoding failed");
            None
        }
    }
}

/// Restore agent state onto a freshly built agent.
///
/// Tries JSON v2 first, then the legacy unversioned shim. Returns `None`
/// (never an error) when the blob cannot be decoded.
pub fn decode_agent(bytes: &[u8], mut fresh: Agent) -> Option<Agent> {
    if bytes.is_empty() {
        return None;
    }

    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(_) => {
            // Not JSON at all — an opaque legacy blob this build cannot
            // interpret. Accepted and discarded.
            warn!("agent state is not JSON; starting fresh");
            return None;
        }
    };

    let obj = value.as_object()?;
    let version = obj.get("version").and_then(|v| v.as_u64());

    match version {
        Some(v) if v == STATE_FORMAT_VERSION as u64 => {
            let doc: AgentStateDoc = match serde_json::from_value(value.clone()) {
                Ok(d) => d,
                Err(e) => {
                    warn!(error = %e, "v2 agent state failed to parse");
                    return None;
                }
            };
            fresh.memory.steps = rehydrate_steps(doc.steps);
            fresh.step_number = doc.step_number;
            fresh.max_steps = doc.max_steps;
            debug!(steps = fresh.memory.len(), "agent restored from JSON v2");
            Some(fresh)
        }
        Some(other) => {
            warn!(version = other, "unsupported agent state version");
            None
        }
        None => {
            // Legacy unversioned document: map forward when the step layout
            // is recognizable, otherwise discard.
            let steps = obj.get("steps").and_then(|s| s.as_array()).cloned()?;
            fresh.memory.steps = rehydrate_steps(steps);
            if let Some(n) = obj.get("step_number").and_then(|v| v.as_u64()) {
                fresh.step_number = n as u32;
            }
            if let Some(n) = obj.get("max_steps").and_then(|v| v.as_u64()) {
                fresh.max_steps = n as u32;
            }
            debug!(steps = fresh.memory.len(), "agent restored from legacy state");
            Some(fresh)
        }
    }
}

/// Parse raw step values, mapping unrecognized kinds to `Unknown` and
/// enforcing monotone step numbers.
fn rehydrate_steps(raw: Vec<serde_json::Value>) -> Vec<MemoryStep> {
    let mut steps = Vec::with_capacity(raw.len());
    let mut last_number: Option<u32> = None;

    for value in raw {
        let step = match serde_json::from_value::<MemoryStep>(value.clone()) {
            Ok(s) => s,
            Err(_) => MemoryStep::Unknown {
                repr: truncate(&value.to_string(), MAX_REPR_CHARS),
            },
        };

        if let Some(n) = step.step_number() {
            if let Some(last) = last_number {
                if n < last {
                    // Out-of-order action step from a corrupt write; drop it
                    // to keep the sequence monotone.
                    continue;
                }
            }
            last_number = Some(n);
        }
        steps.push(step);
    }
    steps
}

fn sanitize_step(step: MemoryStep) -> MemoryStep {
    match step {
        MemoryStep::Action {
            step_number,
            tool_calls,
            model_output,
            code_action,
            observations,
            action_output,
            is_final_answer,
            error: _,
        } => MemoryStep::Action {
            step_number,
            tool_calls,
            model_output,
            code_action,
            observations: observations.map(|o| truncate(&o, MAX_OBSERVATION_CHARS)),
            action_output: action_output.map(|o| truncate(&o, MAX_OUTPUT_CHARS)),
            is_final_answer,
            error: None,
        },
        MemoryStep::FinalAnswer { output } => MemoryStep::FinalAnswer {
            output: output.map(|o| truncate(&o, MAX_OUTPUT_CHARS)),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::ScriptedProvider;
    use crate::agent::AgentKind;
    use crate::provider::ToolCall;
    use std::sync::Arc;

    fn fresh_agent() -> Agent {
        Agent::new(
            "m1".to_string(),
            AgentKind::Code,
            "instructions".to_string(),
            10,
            vec![],
            Arc::new(ScriptedProvider::new(vec![])),
        )
    }

    fn populated_agent() -> Agent {
        let mut a = fresh_agent();
        a.step_number = 3;
        a.memory.push(MemoryStep::Task {
            task: "do the thing".to_string(),
        });
        a.memory.push(MemoryStep::Planning {
            plan: "first, think".to_string(),
        });
        a.memory.push(MemoryStep::Action {
            step_number: 1,
            tool_calls: Some(vec![ToolCall {
                id: "t1".to_string(),
                name: "echo".to_string(),
                arguments: serde_json::json!({"msg": "x"}),
            }]),
            model_output: Some("calling echo".to_string()),
            code_action: None,
            observations: Some("ok".to_string()),
            action_output: None,
            is_final_answer: false,
            error: Some("transient".to_string()),
        });
        a.memory.push(MemoryStep::FinalAnswer {
            output: Some("done".to_string()),
        });
        a
    }

    #[test]
    fn encode_decode_round_trip() {
        let agent = populated_agent();
        let bytes = encode_agent(&agent).unwrap();

        let restored = decode_agent(&bytes, fresh_agent()).unwrap();
        assert_eq!(restored.step_number, 3);
        assert_eq!(restored.max_steps, 10);
        assert_eq!(restored.memory.len(), agent.memory.len());

        match &restored.memory.steps[2] {
            MemoryStep::Action {
                tool_calls, error, ..
            } => {
                assert_eq!(tool_calls.as_ref().unwrap()[0].name, "echo");
                // error cleared on encode
                assert!(error.is_none());
            }
            other => panic!("expected action step, got {other:?}"),
        }
    }

    #[test]
    fn truncation_applied_on_encode() {
        let mut agent = fresh_agent();
        agent.memory.push(MemoryStep::Action {
            step_number: 1,
            tool_calls: None,
            model_output: None,
            code_action: None,
            observations: Some("x".repeat(10_000)),
            action_output: Some("y".repeat(5_000)),
            is_final_answer: false,
            error: None,
        });
        let bytes = encode_agent(&agent).unwrap();
        let restored = decode_agent(&bytes, fresh_agent()).unwrap();
        match &restored.memory.steps[0] {
            MemoryStep::Action {
                observations,
                action_output,
                ..
            } => {
                assert!(observations.as_ref().unwrap().chars().count() <= MAX_OBSERVATION_CHARS + 20);
                assert!(action_output.as_ref().unwrap().chars().count() <= MAX_OUTPUT_CHARS + 20);
            }
            other => panic!("expected action step, got {other:?}"),
        }
    }

    #[test]
    fn unknown_step_kinds_round_trip() {
        let doc = serde_json::json!({
            "version": 2,
            "model_id": "m1",
            "instructions": null,
            "step_number": 1,
            "max_steps": 10,
            "tool_names": [],
            "steps": [
                {"type": "task", "task": "t"},
                {"type": "quantum_step", "data": [1, 2, 3]}
            ]
        });
        let bytes = serde_json::to_vec(&doc).unwrap();
        let restored = decode_agent(&bytes, fresh_agent()).unwrap();

        assert_eq!(restored.memory.len(), 2);
        match &restored.memory.steps[1] {
            MemoryStep::Unknown { repr } => assert!(repr.contains("quantum_step")),
            other => panic!("expected unknown step, got {other:?}"),
        }

        // And it survives another encode/decode cycle.
        let bytes2 = encode_agent(&restored).unwrap();
        let again = decode_agent(&bytes2, fresh_agent()).unwrap();
        assert_eq!(again.memory.len(), 2);
    }

    #[test]
    fn corrupt_blobs_yield_none() {
        assert!(decode_agent(b"", fresh_agent()).is_none());
        assert!(decode_agent(b"\x80\x04binarypickle", fresh_agent()).is_none());
        assert!(decode_agent(b"[1,2,3]", fresh_agent()).is_none());
        assert!(decode_agent(br#"{"version": 99, "steps": []}"#, fresh_agent()).is_none());
    }

    #[test]
    fn legacy_unversioned_state_maps_forward() {
        let legacy = serde_json::json!({
            "model_id": "old-model",
            "step_number": 4,
            "max_steps": 8,
            "steps": [{"type": "task", "task": "legacy task"}]
        });
        let restored =
            decode_agent(&serde_json::to_vec(&legacy).unwrap(), fresh_agent()).unwrap();
        assert_eq!(restored.step_number, 4);
        assert_eq!(restored.max_steps, 8);
        assert!(matches!(
            restored.memory.steps[0],
            MemoryStep::Task { .. }
        ));
    }

    #[test]
    fn out_of_order_action_steps_dropped() {
        let doc = serde_json::json!({
            "version": 2,
            "model_id": null, "instructions": null,
            "step_number": 1, "max_steps": 10, "tool_names": [],
            "steps": [
                {"type": "action", "step_number": 2, "is_final_answer": false},
                {"type": "action", "step_number": 1, "is_final_answer": false},
                {"type": "action", "step_number": 3, "is_final_answer": false}
            ]
        });
        let restored =
            decode_agent(&serde_json::to_vec(&doc).unwrap(), fresh_agent()).unwrap();
        let numbers: Vec<u32> = restored
            .memory
            .steps
            .iter()
            .filter_map(|s| s.step_number())
            .collect();
        assert_eq!(numbers, vec![2, 3]);
    }
}
