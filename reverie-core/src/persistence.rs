//! SQLite log store for agent memory streams.
//!
//! One row per memory record, keyed by `(agent_id, id)`:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS memory_records (
//!     agent_id         TEXT    NOT NULL,
//!     id               INTEGER NOT NULL,
//!     kind             TEXT    NOT NULL,
//!     citations        TEXT    NOT NULL,   -- JSON array of ids
//!     content          TEXT    NOT NULL,
//!     created_at       TEXT    NOT NULL,   -- RFC 3339
//!     last_accessed_at TEXT    NOT NULL,   -- RFC 3339
//!     importance       INTEGER NOT NULL,
//!     embedding        TEXT    NOT NULL,   -- JSON array of floats
//!     PRIMARY KEY (agent_id, id)
//! );
//! ```
//!
//! Appends are single-row inserts, so a record is either fully visible or
//! not at all. Loading re-validates the log's structural invariants.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, Row};
use tracing::{debug, info};

use crate::config::{PersistenceConfig, RetrievalConfig};
use crate::error::{ReverieError, Result};
use crate::memory::{MemoryLog, MemoryRecord};
use crate::types::{Embedding, MemoryId, MemoryKind, Timestamp};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS memory_records (
    agent_id         TEXT    NOT NULL,
    id               INTEGER NOT NULL,
    kind             TEXT    NOT NULL,
    citations        TEXT    NOT NULL,
    content          TEXT    NOT NULL,
    created_at       TEXT    NOT NULL,
    last_accessed_at TEXT    NOT NULL,
    importance       INTEGER NOT NULL,
    embedding        TEXT    NOT NULL,
    PRIMARY KEY (agent_id, id)
);";

/// Handle to an open SQLite database holding memory logs.
///
/// # Usage
///
/// ```no_run
/// # use reverie_core::persistence::LogStore;
/// # use reverie_core::config::{PersistenceConfig, RetrievalConfig};
/// # use reverie_core::memory::MemoryLog;
/// let store = LogStore::open("town.db", &PersistenceConfig::default())?;
/// let log = MemoryLog::new(1024);
/// store.save_log("isabella", &log)?;
/// let loaded = store.load_log("isabella", 1024, &RetrievalConfig::default())?;
/// # Ok::<(), reverie_core::error::ReverieError>(())
/// ```
pub struct LogStore {
    conn: Connection,
    db_path: PathBuf,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl LogStore {
    /// Open (or create) an SQLite database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Log store opened");
        Ok(Self { conn, db_path })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            db_path: PathBuf::from(":memory:"),
        })
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert one freshly appended record.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] if a record with the same id
    /// already exists for `agent_id`, or on any SQLite failure.
    pub fn append_record(&self, agent_id: &str, record: &MemoryRecord) -> Result<()> {
        let row = RowValues::from_record(record)?;
        self.conn.execute(
            "INSERT INTO memory_records
                (agent_id, id, kind, citations, content,
                 created_at, last_accessed_at, importance, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                agent_id,
                row.id,
                row.kind,
                row.citations,
                record.content,
                row.created_at,
                row.last_accessed_at,
                record.importance,
                row.embedding
            ],
        )?;
        debug!(agent = agent_id, memory_id = record.id.0, "Persisted memory record");
        Ok(())
    }

    /// Upsert every record of `log` in one transaction, including refreshed
    /// access times.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures; nothing is
    /// written in that case.
    pub fn save_log(&self, agent_id: &str, log: &MemoryLog) -> Result<()> {
        let start = Instant::now();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO memory_records
                    (agent_id, id, kind, citations, content,
                     created_at, last_accessed_at, importance, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(agent_id, id) DO UPDATE SET
                    last_accessed_at = excluded.last_accessed_at",
            )?;
            for record in log.records() {
                let row = RowValues::from_record(record)?;
                stmt.execute(params![
                    agent_id,
                    row.id,
                    row.kind,
                    row.citations,
                    record.content,
                    row.created_at,
                    row.last_accessed_at,
                    record.importance,
                    row.embedding
                ])?;
            }
        }
        tx.commit()?;
        debug!(
            agent = agent_id,
            records = log.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved memory log"
        );
        Ok(())
    }

    /// Delete every record stored for `agent_id`. Returns how many rows went.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn delete_agent(&self, agent_id: &str) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM memory_records WHERE agent_id = ?1", params![agent_id])?)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Rebuild the memory log stored for `agent_id`. An unknown agent yields
    /// an empty log.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Serialization`] for malformed rows or a
    /// non-contiguous id sequence, [`ReverieError::DimensionMismatch`] for a
    /// wrong-sized embedding, and [`ReverieError::Database`] on SQLite
    /// failures.
    pub fn load_log(
        &self,
        agent_id: &str,
        dimension: usize,
        retrieval: &RetrievalConfig,
    ) -> Result<MemoryLog> {
        let start = Instant::now();
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, kind, citations, content,
                    created_at, last_accessed_at, importance, embedding
             FROM memory_records WHERE agent_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![agent_id], RawRow::read)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        let log = MemoryLog::from_records(dimension, retrieval, records)?;
        debug!(
            agent = agent_id,
            records = log.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded memory log"
        );
        Ok(log)
    }

    /// Look up a single record.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] or [`ReverieError::Serialization`].
    pub fn get_record(&self, agent_id: &str, id: MemoryId) -> Result<Option<MemoryRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, kind, citations, content,
                    created_at, last_accessed_at, importance, embedding
             FROM memory_records WHERE agent_id = ?1 AND id = ?2",
        )?;
        let raw = stmt
            .query_row(params![agent_id, to_sql_id(id)?], RawRow::read)
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    /// Every agent id with at least one stored record, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn list_agents(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT agent_id FROM memory_records ORDER BY agent_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut agents = Vec::new();
        for row in rows {
            agents.push(row?);
        }
        Ok(agents)
    }

    /// Number of records stored for `agent_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] on SQLite failures.
    pub fn record_count(&self, agent_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM memory_records WHERE agent_id = ?1",
            params![agent_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Utility
    // ------------------------------------------------------------------

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run SQLite's integrity check.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::Database`] if the check query itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct RowValues {
    id: i64,
    kind: &'static str,
    citations: String,
    created_at: String,
    last_accessed_at: String,
    embedding: String,
}

impl RowValues {
    fn from_record(record: &MemoryRecord) -> Result<Self> {
        Ok(Self {
            id: to_sql_id(record.id)?,
            kind: record.kind.as_str(),
            citations: to_json(&record.citations)?,
            created_at: record.created_at.to_rfc3339(),
            last_accessed_at: record.last_accessed_at.to_rfc3339(),
            embedding: to_json(&record.embedding)?,
        })
    }
}

struct RawRow {
    id: i64,
    kind: String,
    citations: String,
    content: String,
    created_at: String,
    last_accessed_at: String,
    importance: i32,
    embedding: String,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            citations: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
            last_accessed_at: row.get(5)?,
            importance: row.get(6)?,
            embedding: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<MemoryRecord> {
        let id = u64::try_from(self.id)
            .map_err(|_| ReverieError::Serialization(format!("negative memory id {}", self.id)))?;
        Ok(MemoryRecord {
            id: MemoryId(id),
            kind: MemoryKind::parse(&self.kind)?,
            citations: from_json(&self.citations)?,
            content: self.content,
            created_at: parse_timestamp(&self.created_at)?,
            last_accessed_at: parse_timestamp(&self.last_accessed_at)?,
            importance: self.importance,
            embedding: from_json::<Embedding>(&self.embedding)?,
        })
    }
}

fn to_sql_id(id: MemoryId) -> Result<i64> {
    i64::try_from(id.0)
        .map_err(|_| ReverieError::Serialization(format!("memory id {id} out of range")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| ReverieError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| ReverieError::Serialization(e.to_string()))
}

fn parse_timestamp(text: &str) -> Result<Timestamp> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ReverieError::Serialization(format!("bad timestamp '{text}': {e}")))
}

/// Adds `.optional()` to `rusqlite::Result`, turning "no rows" into `None`.
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
