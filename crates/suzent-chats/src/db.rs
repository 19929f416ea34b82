use rusqlite::Connection;

use crate::error::Result;

/// Initialize the chat-side schema. Idempotent.
///
/// The scheduler owns the `cron_jobs` / `cron_runs` tables and initializes
/// them through its own connection to the same database file.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chats (
            id          TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            config      TEXT NOT NULL DEFAULT '{}',
            messages    TEXT NOT NULL DEFAULT '[]',
            agent_state BLOB,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chats_updated ON chats(updated_at DESC);

        CREATE TABLE IF NOT EXISTS user_preferences (
            user_id    TEXT PRIMARY KEY,
            model      TEXT,
            agent      TEXT,
            tools      TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS mcp_servers (
            name       TEXT PRIMARY KEY,
            transport  TEXT NOT NULL,
            url        TEXT,
            command    TEXT,
            args       TEXT,
            enabled    INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS plans (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id    TEXT NOT NULL,
            version    INTEGER NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_plans_chat ON plans(chat_id, version DESC);

        CREATE TABLE IF NOT EXISTS tasks (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id     INTEGER NOT NULL,
            position    INTEGER NOT NULL,
            description TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending'
        );",
    )?;
    Ok(())
}
