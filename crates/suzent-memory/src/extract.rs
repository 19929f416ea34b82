//! Fact extraction from conversation turns.
//!
//! Two paths share one output shape: an LLM extractor returning JSON, and a
//! deterministic keyword heuristic used when no extraction model is
//! configured. Both produce normalized [`ExtractedFact`]s.

use std::str::FromStr;

use tracing::warn;

use crate::types::{ConversationTurn, ExtractedFact, FactCategory};

pub const EXTRACTION_SYSTEM: &str = "You are a conversation memory extractor. \
Extract durable facts about the USER from the conversation turn below. \
Focus on: identity, preferences, goals, ongoing context, technical details. \
Ignore tool output noise and assistant preamble unless the user confirmed it. \
Respond ONLY with JSON of the form \
{\"facts\":[{\"content\":\"one sentence\",\"category\":\"personal|preference|goal|context|technical|interaction|general\",\"importance\":0.0,\"tags\":[\"tag\"],\"conversation_context\":\"optional\"}]}. \
At most 10 facts. Return {\"facts\":[]} when nothing is worth keeping.";

/// Render a turn into the extraction prompt body.
pub fn format_turn(turn: &ConversationTurn) -> String {
    let mut text = format!(
        "USER: {}\n\nASSISTANT: {}\n",
        turn.user_message, turn.assistant_message
    );
    if !turn.agent_actions.is_empty() {
        text.push_str("\nACTIONS:\n");
        for action in &turn.agent_actions {
            text.push_str(&format!("- {action}\n"));
        }
    }
    if !turn.agent_reasoning.is_empty() {
        text.push_str("\nREASONING:\n");
        for plan in &turn.agent_reasoning {
            text.push_str(&format!("- {plan}\n"));
        }
    }
    text
}

/// Parse the extractor LLM's response into facts.
///
/// Tolerates code fences and surrounding prose: the JSON object (or bare
/// array) is sliced out before parsing. Malformed entries are dropped, not
/// fatal.
pub fn parse_extraction_response(raw: &str) -> Vec<ExtractedFact> {
    let trimmed = raw.trim();

    let slice = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(s), Some(e)) if e > s => &trimmed[s..=e],
        _ => match (trimmed.find('['), trimmed.rfind(']')) {
            (Some(s), Some(e)) if e > s => &trimmed[s..=e],
            _ => trimmed,
        },
    };

    let items: Vec<serde_json::Value> = if let Ok(obj) =
        serde_json::from_str::<serde_json::Value>(slice)
    {
        match obj {
            serde_json::Value::Object(map) => map
                .get("facts")
                .and_then(|f| f.as_array())
                .cloned()
                .unwrap_or_default(),
            serde_json::Value::Array(arr) => arr,
            _ => Vec::new(),
        }
    } else {
        warn!("extraction response did not parse as JSON");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| {
            let content = item.get("content")?.as_str()?.trim().to_string();
            if content.is_empty() {
                return None;
            }
            let category = item
                .get("category")
                .and_then(|c| c.as_str())
                .and_then(|c| FactCategory::from_str(c).ok())
                .unwrap_or(FactCategory::General);
            let importance = item
                .get("importance")
                .and_then(|i| i.as_f64())
                .unwrap_or(0.5) as f32;
            let tags = item
                .get("tags")
                .and_then(|t| t.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|t| t.as_str())
                        .map(|t| t.to_string())
                        .collect()
                })
                .unwrap_or_default();
            let conversation_context = item
                .get("conversation_context")
                .and_then(|c| c.as_str())
                .map(|c| c.to_string());

            Some(
                ExtractedFact {
                    content,
                    category,
                    importance,
                    tags,
                    conversation_context,
                }
                .normalize(),
            )
        })
        .take(10)
        .collect()
}

/// Deterministic keyword extractor for the no-LLM configuration.
///
/// Scans user-message sentences for first-person declarations and maps the
/// trigger phrase to a category. Same input, same facts.
pub fn heuristic_extract(turn: &ConversationTurn) -> Vec<ExtractedFact> {
    const PATTERNS: &[(&str, FactCategory, f32)] = &[
        ("my name is", FactCategory::Personal, 0.9),
        ("call me", FactCategory::Personal, 0.8),
        ("i live in", FactCategory::Personal, 0.8),
        ("i am a", FactCategory::Personal, 0.7),
        ("i'm a", FactCategory::Personal, 0.7),
        ("i work", FactCategory::Context, 0.8),
        ("my job", FactCategory::Context, 0.7),
        ("i prefer", FactCategory::Preference, 0.7),
        ("i like", FactCategory::Preference, 0.6),
        ("i love", FactCategory::Preference, 0.6),
        ("i hate", FactCategory::Preference, 0.6),
        ("i use", FactCategory::Technical, 0.5),
        ("i want to", FactCategory::Goal, 0.7),
        ("my goal", FactCategory::Goal, 0.8),
        ("i plan to", FactCategory::Goal, 0.7),
    ];

    let mut facts = Vec::new();
    for sentence in split_sentences(&turn.user_message) {
        let lower = sentence.to_lowercase();
        if let Some((_, category, importance)) = PATTERNS
            .iter()
            .find(|(pattern, _, _)| lower.contains(pattern))
        {
            let mut content = sentence.trim().to_string();
            if content.len() > 200 {
                content.truncate(200);
            }
            facts.push(
                ExtractedFact {
                    content,
                    category: *category,
                    importance: *importance,
                    tags: vec![category.to_string()],
                    conversation_context: None,
                }
                .normalize(),
            );
        }
        if facts.len() >= 10 {
            break;
        }
    }
    facts
}

fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(user: &str) -> ConversationTurn {
        ConversationTurn {
            user_message: user.to_string(),
            assistant_message: "ok".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn parses_wrapped_json_object() {
        let raw = r#"Here you go:
```json
{"facts":[{"content":"User works on compilers","category":"context","importance":0.8,"tags":["work","compilers"]}]}
```"#;
        let facts = parse_extraction_response(raw);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].category, FactCategory::Context);
        assert_eq!(facts[0].tags, vec!["compilers", "work"]);
    }

    #[test]
    fn parses_bare_array() {
        let raw = r#"[{"content":"Prefers dark mode","category":"preference","importance":0.6}]"#;
        let facts = parse_extraction_response(raw);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].category, FactCategory::Preference);
    }

    #[test]
    fn garbage_yields_no_facts() {
        assert!(parse_extraction_response("not json at all").is_empty());
        assert!(parse_extraction_response("").is_empty());
    }

    #[test]
    fn unknown_category_falls_back_to_general() {
        let raw = r#"{"facts":[{"content":"x","category":"mystery","importance":0.5}]}"#;
        let facts = parse_extraction_response(raw);
        assert_eq!(facts[0].category, FactCategory::General);
    }

    #[test]
    fn importance_clamped() {
        let raw = r#"{"facts":[{"content":"x","category":"general","importance":3.5}]}"#;
        let facts = parse_extraction_response(raw);
        assert_eq!(facts[0].importance, 1.0);
    }

    #[test]
    fn heuristic_finds_name_and_work() {
        let facts = heuristic_extract(&turn("My name is Ada and I work on compilers."));
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].category, FactCategory::Personal);
        assert!(facts[0].content.contains("compilers"));
    }

    #[test]
    fn heuristic_is_deterministic() {
        let t = turn("I prefer tabs. I want to learn Rust.");
        let a = heuristic_extract(&t);
        let b = heuristic_extract(&t);
        assert_eq!(a.len(), 2);
        assert_eq!(
            a.iter().map(|f| f.content.clone()).collect::<Vec<_>>(),
            b.iter().map(|f| f.content.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn heuristic_skips_small_talk() {
        assert!(heuristic_extract(&turn("Hello there, how are you?")).is_empty());
    }
}
