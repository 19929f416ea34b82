use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use suzent_core::types::{
    new_chat_id, now_rfc3339, validate_chat_id, ChatMessage, CHAT_TITLE_MAX_LEN,
};

use crate::db::init_db;
use crate::error::{ChatStoreError, Result};
use crate::types::{Chat, ChatSummary, ChatUpdate};

/// Thread-safe chat store backed by a single SQLite connection.
///
/// Every public operation takes the connection mutex for its full duration,
/// so an `update` is atomic with respect to concurrent `get` calls.
pub struct ChatStore {
    db: Mutex<Connection>,
}

impl ChatStore {
    /// Wrap an open connection, initializing the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Create a chat. When `id` is `None` a fresh UUID is generated;
    /// an explicit id that already exists fails with `AlreadyExists`.
    pub fn create(
        &self,
        id: Option<&str>,
        title: &str,
        config: serde_json::Value,
        messages: Vec<ChatMessage>,
    ) -> Result<Chat> {
        let chat_id = match id {
            Some(explicit) => {
                validate_chat_id(explicit).map_err(|_| ChatStoreError::InvalidInput {
                    field: "chat_id".to_string(),
                    reason: "1..=100 chars of [A-Za-z0-9_-]".to_string(),
                })?;
                explicit.to_string()
            }
            None => new_chat_id(),
        };
        if title.len() > CHAT_TITLE_MAX_LEN {
            return Err(ChatStoreError::InvalidInput {
                field: "title".to_string(),
                reason: format!("must be at most {CHAT_TITLE_MAX_LEN} characters"),
            });
        }

        let now = now_rfc3339();
        let config_json = serde_json::to_string(&config)?;
        let messages_json = serde_json::to_string(&messages)?;

        let db = self.db.lock().unwrap();
        let inserted = db.execute(
            "INSERT OR IGNORE INTO chats (id, title, config, messages, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![chat_id, title, config_json, messages_json, now],
        )?;
        if inserted == 0 {
            return Err(ChatStoreError::AlreadyExists { id: chat_id });
        }

        info!(chat_id = %chat_id, %title, "chat created");
        Ok(Chat {
            id: chat_id,
            title: title.to_string(),
            config,
            messages,
            agent_state: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Fetch a chat with its full message log. Agent state is included.
    pub fn get(&self, id: &str) -> Result<Option<Chat>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, title, config, messages, agent_state, created_at, updated_at
             FROM chats WHERE id = ?1",
            [id],
            row_to_chat,
        )
        .optional()
        .map_err(ChatStoreError::Database)
    }

    /// Fetch only the serialized agent state blob.
    pub fn get_agent_state(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT agent_state FROM chats WHERE id = ?1",
            [id],
            |row| row.get::<_, Option<Vec<u8>>>(0),
        )
        .optional()
        .map_err(ChatStoreError::Database)
        .map(|opt| opt.flatten())
    }

    /// List chat summaries, newest-updated first.
    ///
    /// `search` matches the title and message contents case-insensitively.
    pub fn list(
        &self,
        limit: usize,
        offset: usize,
        search: Option<&str>,
    ) -> Result<Vec<ChatSummary>> {
        let db = self.db.lock().unwrap();
        let mut rows = Vec::new();

        match search {
            Some(q) if !q.is_empty() => {
                let pattern = format!("%{}%", q.to_lowercase());
                let mut stmt = db.prepare(
                    "SELECT id, title, messages, created_at, updated_at FROM chats
                     WHERE LOWER(title) LIKE ?1 OR LOWER(messages) LIKE ?1
                     ORDER BY updated_at DESC LIMIT ?2 OFFSET ?3",
                )?;
                let mapped = stmt.query_map(
                    rusqlite::params![pattern, limit as i64, offset as i64],
                    row_to_summary,
                )?;
                rows.extend(mapped.filter_map(|r| r.ok()));
            }
            _ => {
                let mut stmt = db.prepare(
                    "SELECT id, title, messages, created_at, updated_at FROM chats
                     ORDER BY updated_at DESC LIMIT ?1 OFFSET ?2",
                )?;
                let mapped = stmt.query_map(
                    rusqlite::params![limit as i64, offset as i64],
                    row_to_summary,
                )?;
                rows.extend(mapped.filter_map(|r| r.ok()));
            }
        }
        Ok(rows)
    }

    /// Total chat count for the same search filter.
    pub fn count(&self, search: Option<&str>) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n: i64 = match search {
            Some(q) if !q.is_empty() => {
                let pattern = format!("%{}%", q.to_lowercase());
                db.query_row(
                    "SELECT COUNT(*) FROM chats
                     WHERE LOWER(title) LIKE ?1 OR LOWER(messages) LIKE ?1",
                    [pattern],
                    |row| row.get(0),
                )?
            }
            _ => db.query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))?,
        };
        Ok(n as usize)
    }

    /// Apply a partial update in a single statement.
    ///
    /// Message log and agent state travel together: passing both in one
    /// `ChatUpdate` commits them atomically.
    pub fn update(&self, id: &str, update: ChatUpdate) -> Result<()> {
        if let Some(ref title) = update.title {
            if title.len() > CHAT_TITLE_MAX_LEN {
                return Err(ChatStoreError::InvalidInput {
                    field: "title".to_string(),
                    reason: format!("must be at most {CHAT_TITLE_MAX_LEN} characters"),
                });
            }
        }

        let now = now_rfc3339();
        let mut sets: Vec<String> = vec!["updated_at = ?1".to_string()];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

        if let Some(title) = update.title {
            values.push(Box::new(title));
            sets.push(format!("title = ?{}", values.len()));
        }
        if let Some(config) = update.config {
            values.push(Box::new(serde_json::to_string(&config)?));
            sets.push(format!("config = ?{}", values.len()));
        }
        if let Some(messages) = update.messages {
            values.push(Box::new(serde_json::to_string(&messages)?));
            sets.push(format!("messages = ?{}", values.len()));
        }
        if let Some(state) = update.agent_state {
            values.push(Box::new(state));
            sets.push(format!("agent_state = ?{}", values.len()));
        }

        values.push(Box::new(id.to_string()));
        let sql = format!(
            "UPDATE chats SET {} WHERE id = ?{}",
            sets.join(", "),
            values.len()
        );

        let db = self.db.lock().unwrap();
        let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let changed = db.execute(&sql, params.as_slice())?;
        if changed == 0 {
            return Err(ChatStoreError::NotFound { id: id.to_string() });
        }
        debug!(chat_id = %id, "chat updated");
        Ok(())
    }

    /// Delete a chat permanently.
    pub fn delete(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM chats WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(ChatStoreError::NotFound { id: id.to_string() });
        }
        info!(chat_id = %id, "chat deleted");
        Ok(())
    }

    /// Run a closure with the underlying connection (prefs/plan sub-stores).
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let db = self.db.lock().unwrap();
        f(&db)
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let config_json: String = row.get(2)?;
    let messages_json: String = row.get(3)?;
    Ok(Chat {
        id: row.get(0)?,
        title: row.get(1)?,
        config: serde_json::from_str(&config_json).unwrap_or(serde_json::Value::Null),
        messages: serde_json::from_str(&messages_json).unwrap_or_default(),
        agent_state: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSummary> {
    let messages_json: String = row.get(2)?;
    let message_count = serde_json::from_str::<Vec<serde_json::Value>>(&messages_json)
        .map(|v| v.len())
        .unwrap_or(0);
    Ok(ChatSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        message_count,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChatStore {
        ChatStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn create_and_get_round_trip() {
        let s = store();
        let chat = s
            .create(None, "Test", serde_json::json!({"model": "m1"}), vec![])
            .unwrap();

        let loaded = s.get(&chat.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Test");
        assert_eq!(loaded.config["model"], "m1");
        assert!(loaded.messages.is_empty());
    }

    #[test]
    fn explicit_id_collision_fails() {
        let s = store();
        s.create(Some("cron-1"), "A", serde_json::json!({}), vec![])
            .unwrap();
        let err = s
            .create(Some("cron-1"), "B", serde_json::json!({}), vec![])
            .unwrap_err();
        assert!(matches!(err, ChatStoreError::AlreadyExists { .. }));
    }

    #[test]
    fn forbidden_chat_id_rejected() {
        let s = store();
        let err = s
            .create(Some("bad id!"), "A", serde_json::json!({}), vec![])
            .unwrap_err();
        assert!(matches!(err, ChatStoreError::InvalidInput { .. }));
    }

    #[test]
    fn update_messages_and_state_together() {
        let s = store();
        let chat = s.create(None, "T", serde_json::json!({}), vec![]).unwrap();

        let messages = vec![
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi there"),
        ];
        s.update(
            &chat.id,
            ChatUpdate {
                messages: Some(messages.clone()),
                agent_state: Some(b"{\"version\":2}".to_vec()),
                ..Default::default()
            },
        )
        .unwrap();

        let loaded = s.get(&chat.id).unwrap().unwrap();
        assert_eq!(loaded.messages, messages);
        assert_eq!(loaded.agent_state.as_deref(), Some(&b"{\"version\":2}"[..]));
        assert_eq!(
            s.get_agent_state(&chat.id).unwrap().as_deref(),
            Some(&b"{\"version\":2}"[..])
        );
    }

    #[test]
    fn update_unknown_chat_is_not_found() {
        let s = store();
        let err = s
            .update(
                "missing",
                ChatUpdate {
                    title: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ChatStoreError::NotFound { .. }));
    }

    #[test]
    fn delete_unknown_chat_is_not_found() {
        let s = store();
        assert!(matches!(
            s.delete("missing").unwrap_err(),
            ChatStoreError::NotFound { .. }
        ));
    }

    #[test]
    fn search_matches_title_and_content() {
        let s = store();
        s.create(Some("a1"), "Compiler notes", serde_json::json!({}), vec![])
            .unwrap();
        s.create(
            Some("a2"),
            "Other",
            serde_json::json!({}),
            vec![ChatMessage::user("let's discuss COMPILERS today")],
        )
        .unwrap();
        s.create(Some("a3"), "Unrelated", serde_json::json!({}), vec![])
            .unwrap();

        let hits = s.list(50, 0, Some("compiler")).unwrap();
        let ids: Vec<_> = hits.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&"a1"));
        assert!(ids.contains(&"a2"));
        assert!(!ids.contains(&"a3"));
        assert_eq!(s.count(Some("compiler")).unwrap(), 2);
    }

    #[test]
    fn list_pagination() {
        let s = store();
        for i in 0..5 {
            s.create(Some(&format!("c{i}")), "T", serde_json::json!({}), vec![])
                .unwrap();
        }
        assert_eq!(s.list(2, 0, None).unwrap().len(), 2);
        assert_eq!(s.list(10, 4, None).unwrap().len(), 1);
        assert_eq!(s.count(None).unwrap(), 5);
    }
}
