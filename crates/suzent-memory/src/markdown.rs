//! Markdown memory files — the human-readable source of truth.
//!
//! Two tiers: append-only daily logs (`YYYY-MM-DD.md`) holding timestamped
//! extracted facts, and a curated `MEMORY.md`. The agent reads and writes
//! these files directly through its file tools; the vector index is derived
//! from them and can always be rebuilt.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::types::ExtractedFact;

pub const MEMORY_FILE_NAME: &str = "MEMORY.md";

pub struct MarkdownMemoryStore {
    base_dir: PathBuf,
    /// Serializes all writes; reads go straight to the filesystem.
    write_lock: Mutex<()>,
}

impl MarkdownMemoryStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        info!(dir = %base_dir.display(), "markdown memory store initialized");
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn today() -> String {
        Utc::now().format("%Y-%m-%d").to_string()
    }

    fn daily_log_path(&self, date: &str) -> PathBuf {
        self.base_dir.join(format!("{date}.md"))
    }

    /// Append extracted facts to the daily log, creating the file (with its
    /// header) on first write of the day.
    ///
    /// Entry format — kept in lockstep with the reindex grammar in
    /// [`crate::indexer`]:
    ///
    /// ```text
    /// ## HH:MM - Chat: <chat-id-prefix>
    /// - **[category]** <content> (importance: 0.80)
    ///   - Tags: a, b
    ///   - Context: <conversation context>
    /// ```
    pub async fn append_daily_log(
        &self,
        chat_id: &str,
        facts: &[ExtractedFact],
        date: Option<&str>,
    ) -> Result<()> {
        if facts.is_empty() {
            return Ok(());
        }

        let date = date.map(String::from).unwrap_or_else(Self::today);
        let path = self.daily_log_path(&date);
        let now = Utc::now().format("%H:%M");
        let id_prefix: String = chat_id.chars().take(8).collect();

        let mut entry = format!("\n## {now} - Chat: {id_prefix}\n");
        for fact in facts {
            entry.push_str(&format!(
                "- **[{}]** {} (importance: {:.2})\n",
                fact.category, fact.content, fact.importance
            ));
            if !fact.tags.is_empty() {
                entry.push_str(&format!("  - Tags: {}\n", fact.tags.join(", ")));
            }
            if let Some(ref ctx) = fact.conversation_context {
                entry.push_str(&format!("  - Context: {ctx}\n"));
            }
        }

        let _guard = self.write_lock.lock().await;
        let mut content = if path.exists() {
            std::fs::read_to_string(&path)?
        } else {
            format!("# Daily Log - {date}\n")
        };
        content.push_str(&entry);
        std::fs::write(&path, content)?;

        debug!(count = facts.len(), %date, "facts appended to daily log");
        Ok(())
    }

    /// Read one daily log; `None` when the file does not exist.
    pub async fn read_daily_log(&self, date: &str) -> Result<Option<String>> {
        read_optional(&self.daily_log_path(date))
    }

    /// Concatenated content of the last `days` daily logs, newest first.
    pub async fn get_recent_logs(&self, days: u32) -> Result<String> {
        let today = Utc::now().date_naive();
        let mut parts = Vec::new();
        for i in 0..days {
            let date = (today - chrono::Duration::days(i as i64))
                .format("%Y-%m-%d")
                .to_string();
            if let Some(log) = self.read_daily_log(&date).await? {
                parts.push(log);
            }
        }
        Ok(parts.join("\n\n---\n\n"))
    }

    /// Dates with a daily log on disk, newest first.
    pub async fn list_daily_logs(&self) -> Result<Vec<String>> {
        let mut dates = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name.strip_suffix(".md") {
                if is_date_stem(stem) {
                    dates.push(stem.to_string());
                }
            }
        }
        dates.sort_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    // --- MEMORY.md ----------------------------------------------------------

    pub fn memory_file_path(&self) -> PathBuf {
        self.base_dir.join(MEMORY_FILE_NAME)
    }

    /// Replace MEMORY.md with the given body, framed by a header and a
    /// last-updated footer.
    pub async fn write_memory_file(&self, content: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M UTC");
        let full = format!(
            "# Long-term Memory\n\n{content}\n\n---\n*Last updated: {timestamp}*\n"
        );
        std::fs::write(self.memory_file_path(), full)?;
        info!("MEMORY.md updated");
        Ok(())
    }

    pub async fn read_memory_file(&self) -> Result<Option<String>> {
        read_optional(&self.memory_file_path())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(path)?))
}

/// True for `YYYY-MM-DD` stems.
fn is_date_stem(stem: &str) -> bool {
    let bytes = stem.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && stem
            .chars()
            .enumerate()
            .all(|(i, c)| matches!(i, 4 | 7) || c.is_ascii_digit())
}
