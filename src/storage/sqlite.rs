//! SQLite state store

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::scheduler::{DistributionState, PersistenceAdapter, SchedulerError, SchedulerResult};

/// Persists the distribution state as a row in an embedded SQLite database
///
/// Several independent runs can share one database file under different keys.
#[derive(Debug)]
pub struct SqliteStateStore {
    conn: Connection,
    key: String,
}

impl SqliteStateStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path, key: &str) -> SchedulerResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SchedulerError::io_error("create_dir", e.to_string()))?;
        }

        Self::with_connection(Connection::open(path)?, key)
    }

    /// Open a private in-memory database
    pub fn in_memory(key: &str) -> SchedulerResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, key)
    }

    fn with_connection(conn: Connection, key: &str) -> SchedulerResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS distribution_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn,
            key: key.to_string(),
        })
    }

    /// Key this store reads and writes
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PersistenceAdapter for SqliteStateStore {
    fn save(&self, state: &DistributionState) -> SchedulerResult<()> {
        let value = state.to_json()?;

        self.conn
            .execute(
                "INSERT INTO distribution_state (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                params![self.key, value, Utc::now().to_rfc3339()],
            )
            .map_err(|e| SchedulerError::persistence_write("upsert", e.to_string()))?;

        tracing::debug!(key = %self.key, index = state.current_index, "State saved");
        Ok(())
    }

    fn load(&self) -> SchedulerResult<Option<DistributionState>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM distribution_state WHERE key = ?1",
                params![self.key],
                |row| row.get(0),
            )
            .optional()?;

        value
            .map(|json| {
                DistributionState::from_json(&json)
                    .map_err(|e| SchedulerError::corrupt(format!("key '{}': {e}", self.key)))
            })
            .transpose()
    }

    fn clear(&self) -> SchedulerResult<()> {
        self.conn.execute(
            "DELETE FROM distribution_state WHERE key = ?1",
            params![self.key],
        )?;
        tracing::debug!(key = %self.key, "State cleared");
        Ok(())
    }
}
