//! Skill tool — loads packaged instruction files on demand.
//!
//! Skills are markdown files under `$DATA/skills/<name>/SKILL.md` (or
//! `<name>.md`). The tool returns the file content so the agent can follow
//! it for the rest of the turn.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{Tool, ToolResult};

pub struct SkillTool {
    skills_dir: PathBuf,
    enabled: Vec<String>,
}

impl SkillTool {
    pub fn new(skills_dir: PathBuf, enabled: Vec<String>) -> Self {
        Self {
            skills_dir,
            enabled,
        }
    }

    fn skill_path(&self, name: &str) -> Option<PathBuf> {
        let nested = self.skills_dir.join(name).join("SKILL.md");
        if nested.exists() {
            return Some(nested);
        }
        let flat = self.skills_dir.join(format!("{name}.md"));
        flat.exists().then_some(flat)
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        "skill"
    }

    fn description(&self) -> &str {
        "Load the instructions of a configured skill by name."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Skill name to load." }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let name = match input.get("name").and_then(|n| n.as_str()) {
            Some(n) if !n.is_empty() => n,
            _ => return ToolResult::error("missing or empty 'name' parameter"),
        };

        if !self.enabled.iter().any(|s| s == name) {
            return ToolResult::error(format!(
                "unknown skill '{}'. Available: {}",
                name,
                self.enabled.join(", ")
            ));
        }

        let Some(path) = self.skill_path(name) else {
            return ToolResult::error(format!("skill '{name}' has no SKILL.md on disk"));
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => ToolResult::success(content),
            Err(e) => ToolResult::error(format!("failed to read skill '{name}': {e}")),
        }
    }
}
