//! Archival vector index.
//!
//! Rows live in a SQLite table with embeddings stored as little-endian f32
//! blobs; top-k search runs cosine similarity in process over the user's
//! rows. The markdown store is the durable source of truth — this index is
//! rebuildable from it at any time (see [`crate::indexer`]).

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use suzent_core::types::now_rfc3339;

use crate::embed::cosine_similarity;
use crate::error::{MemoryError, Result};
use crate::types::{ArchivalMemory, FactMetadata, MemoryStats, SearchResult, CORE_MEMORY_LABELS};

pub struct VectorStore {
    db: Mutex<Connection>,
    /// Embedding dimension, pinned by the first insert. 0 = not yet pinned.
    dim: AtomicUsize,
}

impl VectorStore {
    /// Open (or create) the index under `dir/archival.db`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join("archival.db"))?;
        Self::new(conn)
    }

    /// Wrap an open connection, initializing the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS archival_memories (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL,
                chat_id    TEXT,
                content    TEXT NOT NULL,
                embedding  BLOB NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                importance REAL NOT NULL DEFAULT 0.5,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_archival_user ON archival_memories(user_id);

            CREATE TABLE IF NOT EXISTS core_memory (
                user_id    TEXT NOT NULL,
                label      TEXT NOT NULL,
                content    TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, label)
            );",
        )?;

        let store = Self {
            db: Mutex::new(conn),
            dim: AtomicUsize::new(0),
        };
        store.restore_pinned_dimension();
        Ok(store)
    }

    /// Re-pin the dimension from an existing row after a restart.
    fn restore_pinned_dimension(&self) {
        let db = self.db.lock().unwrap();
        if let Ok(blob) = db.query_row(
            "SELECT embedding FROM archival_memories LIMIT 1",
            [],
            |row| row.get::<_, Vec<u8>>(0),
        ) {
            self.dim.store(blob.len() / 4, Ordering::SeqCst);
        }
    }

    /// Pinned embedding dimension, or 0 when the store is empty.
    pub fn dimension(&self) -> usize {
        self.dim.load(Ordering::SeqCst)
    }

    /// Insert a memory row. The first insert pins the embedding dimension
    /// for the process lifetime; later inserts must match it.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &self,
        user_id: &str,
        chat_id: Option<&str>,
        content: &str,
        embedding: &[f32],
        metadata: &FactMetadata,
        importance: f32,
    ) -> Result<String> {
        let pinned = self.dim.load(Ordering::SeqCst);
        if pinned == 0 {
            self.dim.store(embedding.len(), Ordering::SeqCst);
            debug!(dim = embedding.len(), "embedding dimension pinned");
        } else if embedding.len() != pinned {
            return Err(MemoryError::DimensionMismatch {
                expected: pinned,
                got: embedding.len(),
            });
        }

        let id = Uuid::new_v4().to_string();
        let metadata_json = serde_json::to_string(metadata)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO archival_memories
             (id, user_id, chat_id, content, embedding, metadata, importance, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                id,
                user_id,
                chat_id,
                content,
                embedding_to_blob(embedding),
                metadata_json,
                importance as f64,
                now_rfc3339()
            ],
        )?;
        Ok(id)
    }

    /// Top-k rows for a user by cosine similarity against `query`.
    pub fn search_by_embedding(
        &self,
        user_id: &str,
        query: &[f32],
        k: usize,
        min_importance: Option<f32>,
    ) -> Result<Vec<SearchResult>> {
        let min_imp = min_importance.unwrap_or(0.0) as f64;
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, chat_id, content, embedding, metadata, importance, created_at
             FROM archival_memories
             WHERE user_id = ?1 AND importance >= ?2",
        )?;

        let mut scored: Vec<SearchResult> = stmt
            .query_map(rusqlite::params![user_id, min_imp], |row| {
                let blob: Vec<u8> = row.get(4)?;
                let metadata_json: String = row.get(5)?;
                Ok((
                    ArchivalMemory {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        chat_id: row.get(2)?,
                        content: row.get(3)?,
                        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
                        importance: row.get::<_, f64>(6)? as f32,
                        created_at: row.get(7)?,
                    },
                    blob,
                ))
            })?
            .filter_map(|r| r.ok())
            .map(|(memory, blob)| {
                let score = cosine_similarity(query, &blob_to_embedding(&blob));
                SearchResult { memory, score }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// Delete one row by id.
    pub fn delete(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM archival_memories WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(MemoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete every row belonging to a user. Returns the count removed.
    pub fn delete_all(&self, user_id: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM archival_memories WHERE user_id = ?1", [user_id])?;
        info!(user_id, removed = n, "archival memories cleared");
        Ok(n)
    }

    pub fn stats(&self) -> Result<MemoryStats> {
        let db = self.db.lock().unwrap();
        let total: i64 = db.query_row("SELECT COUNT(*) FROM archival_memories", [], |r| r.get(0))?;
        let users: i64 = db.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM archival_memories",
            [],
            |r| r.get(0),
        )?;
        Ok(MemoryStats {
            total_memories: total as usize,
            users: users as usize,
            dimension: self.dim.load(Ordering::SeqCst),
        })
    }

    // --- core memory blocks -------------------------------------------------

    /// All core blocks for a user as (label, content) pairs, label order fixed.
    pub fn get_core_blocks(&self, user_id: &str) -> Result<Vec<(String, String)>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("SELECT label, content FROM core_memory WHERE user_id = ?1")?;
        let mut rows: Vec<(String, String)> = stmt
            .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        rows.sort_by_key(|(label, _)| {
            CORE_MEMORY_LABELS
                .iter()
                .position(|l| l == label)
                .unwrap_or(usize::MAX)
        });
        Ok(rows)
    }

    /// Upsert one core block. The label must come from the fixed set.
    pub fn set_core_block(&self, user_id: &str, label: &str, content: &str) -> Result<()> {
        if !CORE_MEMORY_LABELS.contains(&label) {
            return Err(MemoryError::UnknownLabel(label.to_string()));
        }
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO core_memory (user_id, label, content, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, label) DO UPDATE SET
               content = excluded.content, updated_at = excluded.updated_at",
            rusqlite::params![user_id, label, content, now_rfc3339()],
        )?;
        Ok(())
    }
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
