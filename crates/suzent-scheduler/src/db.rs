use rusqlite::Connection;

use crate::error::Result;

/// Initialize the scheduler-owned tables. Idempotent.
///
/// Lives in the same database file as the chat store; the scheduler opens
/// its own connection so its polling never contends with chat traffic.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cron_jobs (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            name           TEXT NOT NULL,
            cron_expr      TEXT NOT NULL,
            prompt         TEXT NOT NULL,
            active         INTEGER NOT NULL DEFAULT 1,
            delivery_mode  TEXT NOT NULL DEFAULT 'announce',
            model_override TEXT,
            retry_count    INTEGER NOT NULL DEFAULT 0,
            last_run_at    TEXT,
            next_run_at    TEXT,
            last_result    TEXT,
            last_error     TEXT,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cron_runs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id      INTEGER NOT NULL,
            started_at  TEXT NOT NULL,
            finished_at TEXT,
            status      TEXT NOT NULL DEFAULT 'running',
            result      TEXT,
            error       TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_cron_runs_job ON cron_runs(job_id, started_at DESC);",
    )?;
    Ok(())
}
