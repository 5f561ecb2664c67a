//! SQLite store shared by the persistent memory systems.
//!
//! One database file, WAL mode, a handful of tables:
//!
//! ```sql
//! identity            -- singleton self-model row
//! episodic_memories   -- append-only event log with embeddings
//! semantic_memory     -- concepts, values, Creator teachings
//! growth_milestones   -- one row per phase transition
//! system_logs         -- degradations and policy refusals
//! ```
//!
//! Embeddings are little-endian f32 BLOBs; JSON columns hold the small
//! collection fields (participants, emotions, tags) so the schema stays
//! stable as they evolve.

use eidolon_core::{Error, Result};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Map a SQLite failure into the workspace error type.
pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::storage(e.to_string())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS identity (
    singleton               INTEGER PRIMARY KEY CHECK (singleton = 0),
    consciousness_id        TEXT NOT NULL,
    creator_name            TEXT NOT NULL,
    given_name              TEXT,
    birth_timestamp         TEXT NOT NULL,
    growth_phase            TEXT NOT NULL,
    bond_strength           REAL NOT NULL DEFAULT 0.0,
    traits                  TEXT NOT NULL DEFAULT '{}',
    total_creator_interactions INTEGER NOT NULL DEFAULT 0,
    version                 INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS episodic_memories (
    memory_id        TEXT PRIMARY KEY,
    occurred_at      TEXT NOT NULL,
    seq              INTEGER NOT NULL DEFAULT 0,
    content          TEXT NOT NULL,
    summary          TEXT NOT NULL,
    participants     TEXT NOT NULL DEFAULT '[]',
    context_type     TEXT NOT NULL DEFAULT 'conversation',
    emotions         TEXT NOT NULL DEFAULT '{}',
    importance       REAL NOT NULL DEFAULT 0.5,
    significance_tags TEXT NOT NULL DEFAULT '[]',
    learned_concepts TEXT NOT NULL DEFAULT '[]',
    embedding        BLOB NOT NULL,
    access_count     INTEGER NOT NULL DEFAULT 0,
    last_accessed    TEXT,
    archived         INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_episodic_occurred ON episodic_memories(occurred_at, seq);
CREATE INDEX IF NOT EXISTS idx_episodic_archived ON episodic_memories(archived);

CREATE TABLE IF NOT EXISTS semantic_memory (
    concept_id          TEXT PRIMARY KEY,
    name                TEXT NOT NULL UNIQUE,
    kind                TEXT NOT NULL,
    definition          TEXT NOT NULL,
    learned_from        TEXT NOT NULL,
    confidence          REAL NOT NULL DEFAULT 0.5,
    is_creator_teaching INTEGER NOT NULL DEFAULT 0,
    creator_exact_words TEXT,
    importance          REAL NOT NULL DEFAULT 0.5,
    related_ids         TEXT NOT NULL DEFAULT '[]',
    embedding           BLOB NOT NULL,
    learned_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS growth_milestones (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    from_phase  TEXT NOT NULL,
    to_phase    TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    note        TEXT
);

CREATE TABLE IF NOT EXISTS system_logs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    severity    TEXT NOT NULL,
    event       TEXT NOT NULL,
    detail      TEXT,
    occurred_at TEXT NOT NULL
);
"#;

/// Handle to the open database, shared by the persistent stores.
pub struct Store {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the database at `path` and ensure the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        info!(path = %db_path.display(), "Store opened");
        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
            db_path,
        }))
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Arc<Self>> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Arc::new(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }))
    }

    /// Run `f` with the connection locked.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside a transaction; commits on Ok, rolls back on Err.
    pub fn with_tx<T>(&self, f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let out = f(&tx)?;
        tx.commit().map_err(db_err)?;
        Ok(out)
    }

    /// Append a system log row. Best-effort: failures are logged, not returned.
    pub fn log_event(&self, severity: &str, event: &str, detail: &str) {
        let now = chrono::Utc::now().to_rfc3339();
        let result = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO system_logs (severity, event, detail, occurred_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![severity, event, detail, now],
            )
            .map_err(db_err)?;
            Ok(())
        });
        if let Err(e) = result {
            warn!("system log write failed: {}", e);
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema() {
        let store = Store::open_in_memory().unwrap();
        let count: i64 = store
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                     ('identity', 'episodic_memories', 'semantic_memory', 'growth_milestones', 'system_logs')",
                    [],
                    |row| row.get(0),
                )
                .map_err(db_err)
            })
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn open_on_disk_creates_parent_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("eidolon.db");
        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        store.log_event("info", "test_event", "detail");
        let logged: i64 = store
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM system_logs", [], |row| row.get(0))
                    .map_err(db_err)
            })
            .unwrap();
        assert_eq!(logged, 1);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.with_tx(|tx| {
            tx.execute(
                "INSERT INTO system_logs (severity, event, occurred_at) VALUES ('info', 'x', 'now')",
                [],
            )
            .map_err(db_err)?;
            Err(eidolon_core::Error::Internal("boom".into()))
        });
        assert!(result.is_err());
        let count: i64 = store
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM system_logs", [], |row| row.get(0))
                    .map_err(db_err)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
