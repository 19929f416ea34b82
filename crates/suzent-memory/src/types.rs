use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Labels allowed for core memory blocks.
pub const CORE_MEMORY_LABELS: &[&str] = &["persona", "human", "goals", "scratchpad"];

/// Closed category set for extracted facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    Personal,
    Preference,
    Goal,
    Context,
    Technical,
    Interaction,
    General,
    Transcript,
}

impl fmt::Display for FactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FactCategory::Personal => "personal",
            FactCategory::Preference => "preference",
            FactCategory::Goal => "goal",
            FactCategory::Context => "context",
            FactCategory::Technical => "technical",
            FactCategory::Interaction => "interaction",
            FactCategory::General => "general",
            FactCategory::Transcript => "transcript",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FactCategory {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "personal" => Ok(FactCategory::Personal),
            "preference" => Ok(FactCategory::Preference),
            "goal" => Ok(FactCategory::Goal),
            "context" => Ok(FactCategory::Context),
            "technical" => Ok(FactCategory::Technical),
            "interaction" => Ok(FactCategory::Interaction),
            "general" => Ok(FactCategory::General),
            "transcript" => Ok(FactCategory::Transcript),
            _ => Err(()),
        }
    }
}

/// One fact pulled out of a conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub content: String,
    pub category: FactCategory,
    /// Relevance weight in [0, 1].
    pub importance: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_context: Option<String>,
}

impl ExtractedFact {
    /// Clamp importance and deduplicate tags in place.
    pub fn normalize(mut self) -> Self {
        self.importance = self.importance.clamp(0.0, 1.0);
        self.tags.sort();
        self.tags.dedup();
        self
    }
}

/// Provenance metadata stored alongside a vector row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactMetadata {
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_context: Option<String>,
}

/// A stored archival memory row.
#[derive(Debug, Clone, Serialize)]
pub struct ArchivalMemory {
    pub id: String,
    pub user_id: String,
    pub chat_id: Option<String>,
    pub content: String,
    pub metadata: FactMetadata,
    pub importance: f32,
    pub created_at: String,
}

/// A search hit with its cosine similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub memory: ArchivalMemory,
    pub score: f32,
}

/// One full conversation turn as seen by the extractor.
#[derive(Debug, Clone, Default)]
pub struct ConversationTurn {
    pub user_message: String,
    pub assistant_message: String,
    pub agent_actions: Vec<String>,
    pub agent_reasoning: Vec<String>,
}

/// What a call to `MemoryManager::process_turn` produced.
#[derive(Debug, Default, Serialize)]
pub struct TurnMemoryOutcome {
    pub extracted_facts: Vec<ExtractedFact>,
    pub memories_created: Vec<String>,
    pub memories_updated: Vec<String>,
}

/// Counters returned by `VectorStore::stats`.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub users: usize,
    /// 0 until the first embedding pins the dimension.
    pub dimension: usize,
}

/// Counters returned by the markdown reindexer.
#[derive(Debug, Default, Serialize)]
pub struct ReindexStats {
    pub total_files: usize,
    pub total_facts: usize,
    pub indexed: usize,
    pub errors: usize,
}
