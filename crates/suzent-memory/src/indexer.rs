//! Markdown-to-vector reindexer.
//!
//! The daily logs are the durable record; this module parses them with a
//! fixed grammar and rebuilds the archival index, so a lost or corrupted
//! index is never fatal. Running a rebuild twice with `clear_existing` is
//! idempotent.
//!
//! Grammar per entry:
//!
//! ```text
//! ## HH:MM - Chat: <id>
//! - **[category]** <content> (importance: <float>)
//!   - Tags: a, b
//!   - Context: <text>
//!   - Outcome: <text>
//! ```

use std::str::FromStr;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::embed::Embedder;
use crate::error::Result;
use crate::markdown::MarkdownMemoryStore;
use crate::types::{FactCategory, FactMetadata, ReindexStats};
use crate::vector::VectorStore;

/// One fact recovered from a daily log.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFact {
    pub content: String,
    pub category: String,
    pub importance: f32,
    pub tags: Vec<String>,
    pub context: Option<String>,
    pub outcome: Option<String>,
    pub chat_id: Option<String>,
    pub time: Option<String>,
}

pub struct MarkdownIndexer;

impl MarkdownIndexer {
    /// Parse every daily log and rebuild the vector index.
    pub async fn reindex(
        markdown: &MarkdownMemoryStore,
        vector: &VectorStore,
        embedder: &Arc<dyn Embedder>,
        user_id: &str,
        clear_existing: bool,
    ) -> Result<ReindexStats> {
        let mut stats = ReindexStats::default();

        if clear_existing {
            let removed = vector.delete_all(user_id)?;
            info!(user_id, removed, "cleared index before rebuild");
        }

        let dates = markdown.list_daily_logs().await?;
        stats.total_files = dates.len();
        if dates.is_empty() {
            info!("no daily logs found for reindexing");
            return Ok(stats);
        }

        for date in &dates {
            let content = match markdown.read_daily_log(date).await {
                Ok(Some(c)) => c,
                Ok(None) => continue,
                Err(e) => {
                    error!(%date, error = %e, "failed to read daily log");
                    stats.errors += 1;
                    continue;
                }
            };

            let facts = parse_daily_log(&content);
            stats.total_facts += facts.len();

            for fact in facts {
                let embedding = match embedder.embed(&fact.content).await {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(%date, error = %e, "embedding failed during reindex");
                        stats.errors += 1;
                        continue;
                    }
                };
                let metadata = FactMetadata {
                    category: fact.category.clone(),
                    tags: fact.tags.clone(),
                    source_chat_id: fact.chat_id.clone(),
                    source_date: Some(date.clone()),
                    source_time: fact.time.clone(),
                    conversation_context: fact.context.clone(),
                };
                match vector.add(user_id, None, &fact.content, &embedding, &metadata, fact.importance)
                {
                    Ok(_) => stats.indexed += 1,
                    Err(e) => {
                        warn!(%date, error = %e, "vector insert failed during reindex");
                        stats.errors += 1;
                    }
                }
            }
        }

        info!(
            indexed = stats.indexed,
            errors = stats.errors,
            facts = stats.total_facts,
            files = stats.total_files,
            "reindex complete"
        );
        Ok(stats)
    }
}

/// Parse a daily log into structured facts using the fixed grammar.
pub fn parse_daily_log(content: &str) -> Vec<ParsedFact> {
    let lines: Vec<&str> = content.lines().collect();
    let mut facts = Vec::new();
    let mut current_chat: Option<String> = None;
    let mut current_time: Option<String> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if let Some((time, chat)) = parse_section_header(line) {
            current_time = Some(time);
            current_chat = Some(chat);
            i += 1;
            continue;
        }

        if let Some((category, content, importance)) = parse_fact_line(line) {
            let mut tags = Vec::new();
            let mut context = None;
            let mut outcome = None;

            let mut j = i + 1;
            while j < lines.len() && lines[j].starts_with("  ") {
                let sub = lines[j].trim();
                if let Some(rest) = sub.strip_prefix("- Tags:") {
                    tags = rest
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                } else if let Some(rest) = sub.strip_prefix("- Context:") {
                    context = Some(rest.trim().to_string());
                } else if let Some(rest) = sub.strip_prefix("- Outcome:") {
                    outcome = Some(rest.trim().to_string());
                }
                j += 1;
            }

            facts.push(ParsedFact {
                content,
                category,
                importance,
                tags,
                context,
                outcome,
                chat_id: current_chat.clone(),
                time: current_time.clone(),
            });
            i = j;
            continue;
        }

        i += 1;
    }

    facts
}

/// `## HH:MM - Chat: <id>` → (time, chat id).
fn parse_section_header(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("## ")?;
    let (time, rest) = rest.split_once(" - Chat: ")?;
    let time = time.trim();
    if time.len() != 5 || time.as_bytes()[2] != b':' {
        return None;
    }
    if !time
        .chars()
        .enumerate()
        .all(|(i, c)| i == 2 || c.is_ascii_digit())
    {
        return None;
    }
    let chat = rest.split_whitespace().next()?.to_string();
    Some((time.to_string(), chat))
}

/// `- **[category]** <content> (importance: <f>)` → (category, content, importance).
fn parse_fact_line(line: &str) -> Option<(String, String, f32)> {
    let rest = line.strip_prefix("- **[")?;
    let (category, rest) = rest.split_once("]**")?;
    FactCategory::from_str(category).ok()?;

    let rest = rest.trim();
    let open = rest.rfind("(importance: ")?;
    let close = rest[open..].find(')')? + open;
    let importance: f32 = rest[open + "(importance: ".len()..close].parse().ok()?;
    let content = rest[..open].trim().to_string();
    if content.is_empty() {
        return None;
    }
    Some((category.to_string(), content, importance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::types::ExtractedFact;
    use rusqlite::Connection;

    const SAMPLE: &str = "# Daily Log - 2026-08-01\n\n\
## 09:15 - Chat: chat-ab1\n\
- **[personal]** User's name is Ada (importance: 0.90)\n\
  - Tags: identity, name\n\
- **[context]** Works on compilers (importance: 0.80)\n\
  - Context: career discussion\n\
  - Outcome: noted\n\n\
## 14:30 - Chat: cron-7\n\
- **[technical]** Prefers rustc nightly (importance: 0.50)\n";

    #[test]
    fn parses_sections_and_facts() {
        let facts = parse_daily_log(SAMPLE);
        assert_eq!(facts.len(), 3);

        assert_eq!(facts[0].content, "User's name is Ada");
        assert_eq!(facts[0].category, "personal");
        assert_eq!(facts[0].importance, 0.90);
        assert_eq!(facts[0].tags, vec!["identity", "name"]);
        assert_eq!(facts[0].chat_id.as_deref(), Some("chat-ab1"));
        assert_eq!(facts[0].time.as_deref(), Some("09:15"));

        assert_eq!(facts[1].context.as_deref(), Some("career discussion"));
        assert_eq!(facts[1].outcome.as_deref(), Some("noted"));

        assert_eq!(facts[2].chat_id.as_deref(), Some("cron-7"));
    }

    #[test]
    fn ignores_unparseable_lines() {
        let facts = parse_daily_log("random text\n- not a fact\n## bad header\n");
        assert!(facts.is_empty());
    }

    #[test]
    fn writer_output_round_trips_through_parser() {
        // What append_daily_log writes must parse back to the same tuples.
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = MarkdownMemoryStore::new(dir.path()).unwrap();

            let written = vec![
                ExtractedFact {
                    content: "User's name is Ada".to_string(),
                    category: FactCategory::Personal,
                    importance: 0.9,
                    tags: vec!["identity".to_string()],
                    conversation_context: Some("intro".to_string()),
                },
                ExtractedFact {
                    content: "Ships a compiler at work".to_string(),
                    category: FactCategory::Context,
                    importance: 0.75,
                    tags: vec![],
                    conversation_context: None,
                },
            ];
            store
                .append_daily_log("chat-round-trip", &written, Some("2026-08-01"))
                .await
                .unwrap();

            let content = store.read_daily_log("2026-08-01").await.unwrap().unwrap();
            let parsed = parse_daily_log(&content);
            assert_eq!(parsed.len(), written.len());
            for (p, w) in parsed.iter().zip(&written) {
                assert_eq!(p.content, w.content);
                assert_eq!(p.category, w.category.to_string());
                assert!((p.importance - w.importance).abs() < 0.005);
                assert_eq!(p.tags, w.tags);
            }
        });
    }

    #[tokio::test]
    async fn reindex_twice_with_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let markdown = MarkdownMemoryStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("2026-08-01.md"), SAMPLE).unwrap();

        let vector = VectorStore::new(Connection::open_in_memory().unwrap()).unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());

        let first = MarkdownIndexer::reindex(&markdown, &vector, &embedder, "u1", true)
            .await
            .unwrap();
        let count_after_first = vector.stats().unwrap().total_memories;

        let second = MarkdownIndexer::reindex(&markdown, &vector, &embedder, "u1", true)
            .await
            .unwrap();
        let count_after_second = vector.stats().unwrap().total_memories;

        assert_eq!(first.indexed, 3);
        assert_eq!(second.indexed, 3);
        assert_eq!(count_after_first, count_after_second);
    }
}
