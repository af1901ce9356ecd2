// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed durable store for domain records.
//!
//! The [`Database`] struct provides keyed record storage across the
//! application's named stores. Every operation runs through a retry
//! executor: recoverable failures (busy/locked database, interrupted I/O)
//! are retried with exponential backoff, fatal failures (disk full, schema
//! from a newer build, unknown store) surface immediately.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::clock::{ClockSource, SystemClock};
use crate::error::{Error, Result};
use crate::record::Record;

/// The named stores of the current schema.
///
/// Restore and repair skip data belonging to any store not listed here.
pub const KNOWN_STORES: &[&str] = &["generations", "projects", "models"];

/// Returns true if the store name exists in the current schema.
pub fn is_known_store(store: &str) -> bool {
    KNOWN_STORES.contains(&store)
}

/// Schema version written to `PRAGMA user_version`.
///
/// A database reporting a higher version was created by a newer build and
/// is never touched.
pub const SCHEMA_VERSION: i32 = 1;

/// SQL schema for the record store.
pub const SCHEMA: &str = r#"
-- Keyed record storage, one row per domain entity per named store
CREATE TABLE IF NOT EXISTS records (
    store TEXT NOT NULL,
    id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (store, id)
);

CREATE INDEX IF NOT EXISTS idx_records_store_created ON records(store, created_at);
"#;

/// Default bound on retry attempts for recoverable failures.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Base delay for the retry executor's exponential backoff.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Runs a storage operation, retrying recoverable failures.
///
/// Backoff starts at `base_delay` and doubles per attempt. Errors that are
/// not recoverable surface immediately. Once `max_retries` recoverable
/// failures have been consumed, the last error is surfaced wrapped in
/// [`Error::RetryExhausted`] carrying the operation name.
pub fn with_retry<T>(
    name: &str,
    max_retries: u32,
    base_delay: Duration,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 0;
    let mut delay = base_delay;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() && attempt < max_retries => {
                attempt += 1;
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(e) if e.is_recoverable() => {
                return Err(Error::RetryExhausted {
                    name: name.to_string(),
                    attempts: attempt + 1,
                    source: Box::new(e),
                });
            }
            Err(e) => return Err(promote_fatal(name, e)),
        }
    }
}

/// Gives a full-disk failure its dedicated error before it surfaces.
fn promote_fatal(name: &str, e: Error) -> Error {
    match &e {
        Error::Database(rusqlite::Error::SqliteFailure(f, _))
            if f.code == rusqlite::ErrorCode::DiskFull =>
        {
            Error::QuotaExceeded(name.to_string())
        }
        _ => e,
    }
}

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(value: &str, column: &str) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(Error::CorruptedData(format!(
                    "invalid timestamp '{value}' in column '{column}'"
                ))),
            )
        })
}

/// Parse a JSON payload from the database.
fn parse_payload(value: &str) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    serde_json::from_str(value).map_err(|_| {
        let excerpt: String = value.chars().take(40).collect();
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(Error::CorruptedData(format!("invalid payload '{excerpt}'"))),
        )
    })
}

/// Run schema creation and migrations on a database connection.
///
/// Refuses databases stamped with a newer schema version, applies the
/// canonical schema idempotently, then stamps the current version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let found: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if found > SCHEMA_VERSION {
        return Err(Error::SchemaMismatch {
            found,
            supported: SCHEMA_VERSION,
        });
    }

    conn.execute_batch(SCHEMA)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// SQLite database connection with record store operations.
pub struct Database {
    /// The underlying SQLite connection.
    pub conn: Connection,
    retry_limit: u32,
    retry_delay: Duration,
    clock: Arc<dyn ClockSource>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("retry_limit", &self.retry_limit)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open a database at the given path, creating and migrating if needed.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL so backup reads never block the primary write path
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        run_migrations(&conn)?;
        Ok(Database {
            conn,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_delay: RETRY_BASE_DELAY,
            clock: Arc::new(SystemClock),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        run_migrations(&conn)?;
        Ok(Database {
            conn,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_delay: RETRY_BASE_DELAY,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the clock used for repair timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Overrides the retry policy (attempt bound and backoff base delay).
    pub fn with_retry_policy(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.retry_limit = max_retries;
        self.retry_delay = base_delay;
        self
    }

    pub(crate) fn clock(&self) -> &dyn ClockSource {
        self.clock.as_ref()
    }

    fn check_store(&self, store: &str) -> Result<()> {
        if is_known_store(store) {
            Ok(())
        } else {
            Err(Error::UnknownStore(store.to_string()))
        }
    }

    /// Write a record, replacing any existing record with the same id.
    pub fn put(&self, store: &str, record: &Record) -> Result<()> {
        self.check_store(store)?;
        let payload = serde_json::to_string(&record.payload)?;

        with_retry("put", self.retry_limit, self.retry_delay, || {
            self.conn.execute(
                "INSERT INTO records (store, id, created_at, updated_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (store, id) DO UPDATE SET
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at,
                     payload = excluded.payload",
                params![
                    store,
                    record.id,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                    payload,
                ],
            )?;
            Ok(())
        })
    }

    /// Get a record by id.
    pub fn get(&self, store: &str, id: &str) -> Result<Record> {
        self.check_store(store)?;

        let record = with_retry("get", self.retry_limit, self.retry_delay, || {
            let record = self
                .conn
                .query_row(
                    "SELECT id, created_at, updated_at, payload
                     FROM records WHERE store = ?1 AND id = ?2",
                    params![store, id],
                    map_record_row,
                )
                .optional()?;
            Ok(record)
        })?;

        record.ok_or_else(|| Error::RecordNotFound {
            store: store.to_string(),
            id: id.to_string(),
        })
    }

    /// Returns true if a record with this id exists.
    pub fn exists(&self, store: &str, id: &str) -> Result<bool> {
        self.check_store(store)?;

        with_retry("exists", self.retry_limit, self.retry_delay, || {
            let found: bool = self.conn.query_row(
                "SELECT COUNT(*) > 0 FROM records WHERE store = ?1 AND id = ?2",
                params![store, id],
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    /// Get all records in a store, oldest first.
    pub fn get_all(&self, store: &str) -> Result<Vec<Record>> {
        self.check_store(store)?;

        with_retry("get_all", self.retry_limit, self.retry_delay, || {
            let mut stmt = self.conn.prepare(
                "SELECT id, created_at, updated_at, payload
                 FROM records WHERE store = ?1
                 ORDER BY created_at, id",
            )?;
            let records = stmt
                .query_map(params![store], map_record_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    /// Delete a record by id. Returns true if a record was removed.
    pub fn delete(&self, store: &str, id: &str) -> Result<bool> {
        self.check_store(store)?;

        with_retry("delete", self.retry_limit, self.retry_delay, || {
            let changed = self.conn.execute(
                "DELETE FROM records WHERE store = ?1 AND id = ?2",
                params![store, id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Write a batch of records in one transaction.
    ///
    /// A failure rolls back the whole batch; no partial subset is ever
    /// visible.
    pub fn bulk_save(&mut self, store: &str, records: &[Record]) -> Result<()> {
        self.check_store(store)?;

        let payloads = records
            .iter()
            .map(|r| serde_json::to_string(&r.payload))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let conn = &mut self.conn;
        with_retry("bulk_save", self.retry_limit, self.retry_delay, || {
            let tx = conn.transaction()?;
            for (record, payload) in records.iter().zip(&payloads) {
                tx.execute(
                    "INSERT INTO records (store, id, created_at, updated_at, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (store, id) DO UPDATE SET
                         created_at = excluded.created_at,
                         updated_at = excluded.updated_at,
                         payload = excluded.payload",
                    params![
                        store,
                        record.id,
                        record.created_at.to_rfc3339(),
                        record.updated_at.to_rfc3339(),
                        payload,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Number of records in a store.
    pub fn count(&self, store: &str) -> Result<usize> {
        self.check_store(store)?;

        with_retry("count", self.retry_limit, self.retry_delay, || {
            let n: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM records WHERE store = ?1",
                params![store],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
    }
}

fn map_record_row(row: &rusqlite::Row<'_>) -> std::result::Result<Record, rusqlite::Error> {
    let id: String = row.get(0)?;
    let created_str: String = row.get(1)?;
    let updated_str: String = row.get(2)?;
    let payload_str: String = row.get(3)?;

    Ok(Record {
        id,
        created_at: parse_timestamp(&created_str, "created_at")?,
        updated_at: parse_timestamp(&updated_str, "updated_at")?,
        payload: parse_payload(&payload_str)?,
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
