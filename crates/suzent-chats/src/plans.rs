//! Versioned plan snapshots written by the agent's planning tool.

use rusqlite::OptionalExtension;

use suzent_core::types::now_rfc3339;

use crate::error::{ChatStoreError, Result};
use crate::store::ChatStore;
use crate::types::Plan;

impl ChatStore {
    /// Append a new plan version for a chat and return it.
    pub fn save_plan(&self, chat_id: &str, content: &str) -> Result<Plan> {
        self.with_conn(|db| {
            let version: i64 = db.query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM plans WHERE chat_id = ?1",
                [chat_id],
                |row| row.get(0),
            )?;
            let now = now_rfc3339();
            db.execute(
                "INSERT INTO plans (chat_id, version, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![chat_id, version, content, now],
            )?;
            Ok(Plan {
                id: db.last_insert_rowid(),
                chat_id: chat_id.to_string(),
                version,
                content: content.to_string(),
                created_at: now,
            })
        })
    }

    /// Latest plan version for a chat, if any.
    pub fn latest_plan(&self, chat_id: &str) -> Result<Option<Plan>> {
        self.with_conn(|db| {
            db.query_row(
                "SELECT id, chat_id, version, content, created_at FROM plans
                 WHERE chat_id = ?1 ORDER BY version DESC LIMIT 1",
                [chat_id],
                row_to_plan,
            )
            .optional()
            .map_err(ChatStoreError::Database)
        })
    }

    /// Full plan history for a chat, newest first.
    pub fn list_plans(&self, chat_id: &str) -> Result<Vec<Plan>> {
        self.with_conn(|db| {
            let mut stmt = db.prepare(
                "SELECT id, chat_id, version, content, created_at FROM plans
                 WHERE chat_id = ?1 ORDER BY version DESC",
            )?;
            let rows = stmt.query_map([chat_id], row_to_plan)?;
            Ok(rows.filter_map(|r| r.ok()).collect())
        })
    }
}

fn row_to_plan(row: &rusqlite::Row<'_>) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        version: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}
