//! Memory manager — orchestrates extraction, embedding, and persistence.
//!
//! A turn flows extract → embed → vector insert → daily-log append. Every
//! stage is best-effort: an extraction or embedding failure is logged and
//! never propagates into the chat turn that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::embed::Embedder;
use crate::error::Result;
use crate::extract::{
    format_turn, heuristic_extract, parse_extraction_response, EXTRACTION_SYSTEM,
};
use crate::markdown::MarkdownMemoryStore;
use crate::types::{
    ConversationTurn, ExtractedFact, FactMetadata, MemoryStats, SearchResult, TurnMemoryOutcome,
};
use crate::vector::VectorStore;

/// Narrow seam to the LLM used for extraction (and compression summaries).
///
/// The actual transport lives outside this crate; tests plug in a fake.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str, temperature: f32) -> Result<String>;
}

pub struct MemoryManager {
    vector: Arc<VectorStore>,
    markdown: Option<Arc<MarkdownMemoryStore>>,
    embedder: Arc<dyn Embedder>,
    /// `None` selects the deterministic heuristic extractor.
    extractor: Option<Arc<dyn CompletionClient>>,
}

impl MemoryManager {
    pub fn new(
        vector: Arc<VectorStore>,
        markdown: Option<Arc<MarkdownMemoryStore>>,
        embedder: Arc<dyn Embedder>,
        extractor: Option<Arc<dyn CompletionClient>>,
    ) -> Self {
        info!(
            extraction = if extractor.is_some() { "llm" } else { "heuristic" },
            markdown = markdown.is_some(),
            "memory manager initialized"
        );
        Self {
            vector,
            markdown,
            embedder,
            extractor,
        }
    }

    pub fn vector(&self) -> &VectorStore {
        &self.vector
    }

    pub fn markdown(&self) -> Option<&Arc<MarkdownMemoryStore>> {
        self.markdown.as_ref()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Extract facts from a finished turn and persist them in both tiers.
    ///
    /// Never fails the caller: every error path logs and returns what was
    /// written so far.
    pub async fn process_turn(
        &self,
        turn: &ConversationTurn,
        chat_id: &str,
        user_id: &str,
    ) -> TurnMemoryOutcome {
        let facts = self.extract_facts(turn).await;
        if facts.is_empty() {
            debug!(chat_id, "no facts extracted from turn");
            return TurnMemoryOutcome::default();
        }

        let mut outcome = TurnMemoryOutcome {
            extracted_facts: facts.clone(),
            ..Default::default()
        };

        let today = MarkdownMemoryStore::today();
        let now_time = chrono::Utc::now().format("%H:%M").to_string();

        for fact in &facts {
            let embedding = match self.embedder.embed(&fact.content).await {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "embedding failed, fact skipped from index");
                    continue;
                }
            };
            let metadata = FactMetadata {
                category: fact.category.to_string(),
                tags: fact.tags.clone(),
                source_chat_id: Some(chat_id.to_string()),
                source_date: Some(today.clone()),
                source_time: Some(now_time.clone()),
                conversation_context: fact.conversation_context.clone(),
            };
            match self.vector.add(
                user_id,
                Some(chat_id),
                &fact.content,
                &embedding,
                &metadata,
                fact.importance,
            ) {
                Ok(id) => outcome.memories_created.push(id),
                Err(e) => warn!(error = %e, "vector insert failed"),
            }
        }

        if let Some(ref markdown) = self.markdown {
            if let Err(e) = markdown.append_daily_log(chat_id, &facts, None).await {
                error!(error = %e, "daily log append failed");
            }
        }

        info!(
            chat_id,
            facts = facts.len(),
            indexed = outcome.memories_created.len(),
            "turn memories processed"
        );
        outcome
    }

    async fn extract_facts(&self, turn: &ConversationTurn) -> Vec<ExtractedFact> {
        match self.extractor {
            Some(ref llm) => {
                let prompt = format_turn(turn);
                match llm.complete(EXTRACTION_SYSTEM, &prompt, 0.2).await {
                    Ok(raw) => parse_extraction_response(&raw),
                    Err(e) => {
                        warn!(error = %e, "LLM extraction failed, falling back to heuristic");
                        heuristic_extract(turn)
                    }
                }
            }
            None => heuristic_extract(turn),
        }
    }

    /// Embed the query and search the archival index.
    pub async fn search(
        &self,
        query: &str,
        user_id: &str,
        k: usize,
        min_importance: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        let query_vec = self.embedder.embed(query).await?;
        self.vector
            .search_by_embedding(user_id, &query_vec, k, min_importance)
    }

    pub fn stats(&self) -> Result<MemoryStats> {
        self.vector.stats()
    }

    // --- prompt context rendering -------------------------------------------

    /// Render the user's core memory blocks into a prompt section.
    /// `None` when no blocks are set.
    pub fn format_core_memory_for_context(&self, user_id: &str) -> Result<Option<String>> {
        let blocks = self.vector.get_core_blocks(user_id)?;
        if blocks.is_empty() {
            return Ok(None);
        }
        let mut out = String::from("## Core Memory\n");
        for (label, content) in blocks {
            out.push_str(&format!("### {label}\n{content}\n"));
        }
        Ok(Some(out))
    }

    /// Retrieval context for a new turn: top-k archival facts relevant to
    /// the incoming message. `None` when the index has nothing relevant.
    pub async fn format_retrieval_context(
        &self,
        query: &str,
        user_id: &str,
        k: usize,
    ) -> Result<Option<String>> {
        let hits = self.search(query, user_id, k, Some(0.0)).await?;
        if hits.is_empty() {
            return Ok(None);
        }
        let mut out = String::from("## Relevant Memories\n");
        for hit in hits {
            out.push_str(&format!(
                "- [{}] {}\n",
                hit.memory.metadata.category, hit.memory.content
            ));
        }
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use rusqlite::Connection;

    fn manager_with_markdown(dir: &std::path::Path) -> MemoryManager {
        let vector = Arc::new(VectorStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let markdown = Arc::new(MarkdownMemoryStore::new(dir).unwrap());
        MemoryManager::new(vector, Some(markdown), Arc::new(HashEmbedder::default()), None)
    }

    fn turn(user: &str) -> ConversationTurn {
        ConversationTurn {
            user_message: user.to_string(),
            assistant_message: "noted".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn write_then_search_visibility() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager_with_markdown(dir.path());

        let outcome = m
            .process_turn(
                &turn("My name is Ada and I work on compilers."),
                "chat-1",
                "u1",
            )
            .await;
        assert_eq!(outcome.memories_created.len(), 1);

        let hits = m
            .search("what does the user work on", "u1", 1, Some(0.0))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].memory.content.contains("compilers"));
    }

    #[tokio::test]
    async fn turn_facts_land_in_daily_log() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager_with_markdown(dir.path());

        m.process_turn(&turn("I prefer dark roast coffee."), "chat-2", "u1")
            .await;

        let md = m.markdown().unwrap();
        let today = MarkdownMemoryStore::today();
        let log = md.read_daily_log(&today).await.unwrap().unwrap();
        assert!(log.contains("dark roast"));
        assert!(log.contains("**[preference]**"));
    }

    #[tokio::test]
    async fn empty_turn_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager_with_markdown(dir.path());
        let outcome = m.process_turn(&turn("hello!"), "chat-3", "u1").await;
        assert!(outcome.extracted_facts.is_empty());
        assert_eq!(m.stats().unwrap().total_memories, 0);
    }

    #[tokio::test]
    async fn core_memory_renders_into_section() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager_with_markdown(dir.path());
        assert!(m.format_core_memory_for_context("u1").unwrap().is_none());

        m.vector().set_core_block("u1", "human", "Name: Ada").unwrap();
        let ctx = m.format_core_memory_for_context("u1").unwrap().unwrap();
        assert!(ctx.contains("## Core Memory"));
        assert!(ctx.contains("### human"));
        assert!(ctx.contains("Name: Ada"));
    }

    struct FailingExtractor;

    #[async_trait]
    impl CompletionClient for FailingExtractor {
        async fn complete(&self, _: &str, _: &str, _: f32) -> Result<String> {
            Err(crate::error::MemoryError::Extraction("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let vector = Arc::new(VectorStore::new(Connection::open_in_memory().unwrap()).unwrap());
        let markdown = Arc::new(MarkdownMemoryStore::new(dir.path()).unwrap());
        let m = MemoryManager::new(
            vector,
            Some(markdown),
            Arc::new(HashEmbedder::default()),
            Some(Arc::new(FailingExtractor)),
        );

        let outcome = m
            .process_turn(&turn("My name is Ada."), "chat-4", "u1")
            .await;
        assert_eq!(outcome.extracted_facts.len(), 1);
    }
}
