//! SQLite-based credential and event storage.
//!
//! Provides persistent storage for:
//! - Key-value credential material (one row per credential key)
//! - A log of session events for `session history`

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::data_dir;
use crate::credentials::{CredentialStore, SESSION_KEYS};
use crate::error::{CredentialError, DatabaseError};
use crate::events::SessionEvent;

/// A logged session event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub event_type: String,
    pub at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// SQLite database for credential and event storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/recertify/recertify.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let path = data_dir()
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?
            .join("recertify.db");
        Self::open_at(&path)
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS session_events (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_type  TEXT NOT NULL,
                    at          TEXT NOT NULL,
                    payload     TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_session_events_at ON session_events(at);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Append a session event to the history log.
    pub fn record_event(&self, event: &SessionEvent) -> Result<i64, DatabaseError> {
        let payload =
            serde_json::to_string(event).map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO session_events (event_type, at, payload) VALUES (?1, ?2, ?3)",
            params![event.kind(), event.at().to_rfc3339(), payload],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent events first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_type, at, payload FROM session_events
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, event_type, at, payload) = row?;
            let at = DateTime::parse_from_rfc3339(&at)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?
                .with_timezone(&Utc);
            let payload = serde_json::from_str(&payload)
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            records.push(EventRecord {
                id,
                event_type,
                at,
                payload,
            });
        }
        Ok(records)
    }
}

impl CredentialStore for Database {
    fn get_credential(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.kv_get(key)?)
    }

    fn set_credential(&mut self, key: &str, value: &str) -> Result<(), CredentialError> {
        Ok(self.kv_set(key, value)?)
    }

    fn clear_credentials(&mut self) -> Result<(), CredentialError> {
        for key in SESSION_KEYS {
            self.kv_delete(key)?;
        }
        Ok(())
    }
}
