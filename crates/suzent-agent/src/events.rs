//! Streaming events and their SSE encoding.
//!
//! The agent loop emits [`AgentEvent`]s; the turn processor turns each one
//! into exactly one SSE frame. The frame is a pure function of the event.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Token or partial model output.
    StreamDelta(String),
    /// A plan produced by the agent.
    Planning(String),
    /// A tool call and its result.
    Action { tool: String, output: String },
    /// Output of an executed action step.
    ActionOutput(String),
    /// The final answer; always the last non-error event when present.
    FinalAnswer(String),
    Error(String),
}

impl AgentEvent {
    /// Encode as one SSE frame: `data: <json>\n\n`.
    pub fn sse_frame(&self) -> String {
        // Serialization of this enum cannot fail; fall back to a generic
        // error frame just in case.
        let json = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","data":"event serialization failed"}"#.to_string()
        });
        format!("data: {json}\n\n")
    }

    /// Final-answer text when this event carries one.
    pub fn final_answer(&self) -> Option<&str> {
        match self {
            AgentEvent::FinalAnswer(text) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_sse_shaped() {
        let frame = AgentEvent::StreamDelta("hel".to_string()).sse_frame();
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains(r#""type":"stream_delta""#));
        assert!(frame.contains(r#""data":"hel""#));
    }

    #[test]
    fn action_event_carries_tool_and_output() {
        let frame = AgentEvent::Action {
            tool: "planning".to_string(),
            output: "saved".to_string(),
        }
        .sse_frame();
        assert!(frame.contains(r#""tool":"planning""#));
        assert!(frame.contains(r#""output":"saved""#));
    }

    #[test]
    fn final_answer_accessor() {
        assert_eq!(
            AgentEvent::FinalAnswer("done".to_string()).final_answer(),
            Some("done")
        );
        assert_eq!(AgentEvent::Error("x".to_string()).final_answer(), None);
    }
}
