//! Instruction composition for newly built agents.

use serde::Deserialize;

/// Social context attached to a platform-driven turn's config.
#[derive(Debug, Clone, Deserialize)]
pub struct SocialContext {
    pub platform: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub target_id: String,
}

/// Compose the agent's system instructions from its parts.
///
/// Order: base instructions, current date, sandbox volumes, core memory,
/// social context. Sections absent from the turn are simply omitted.
pub fn compose_instructions(
    base: &str,
    memory_context: Option<&str>,
    volumes: &[String],
    social: Option<&SocialContext>,
) -> String {
    let mut parts = Vec::new();

    if !base.trim().is_empty() {
        parts.push(base.trim().to_string());
    }

    let today = chrono::Utc::now().format("%Y-%m-%d");
    parts.push(format!("Current date: {today}"));

    if !volumes.is_empty() {
        let mut section = String::from("Mounted volumes (host:container):\n");
        for volume in volumes {
            section.push_str(&format!("- {volume}\n"));
        }
        parts.push(section.trim_end().to_string());
    }

    if let Some(memory) = memory_context {
        if !memory.trim().is_empty() {
            parts.push(memory.trim().to_string());
        }
    }

    if let Some(social) = social {
        parts.push(build_social_section(social));
    }

    parts.join("\n\n")
}

fn build_social_section(social: &SocialContext) -> String {
    format!(
        "## Social Context\nThis turn was triggered from {platform} by {name} (id: {id}). \
         Replies go to target '{target}' by default. Use the social_message tool for \
         progress updates; your final answer is delivered automatically.",
        platform = social.platform,
        name = social.sender_name,
        id = social.sender_id,
        target = social.target_id,
    )
}
