// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for reel-core operations.
//!
//! Errors are classified for the retry executor: *fatal* errors (quota
//! exhaustion, schema mismatch, unknown store) surface immediately and are
//! never retried; *recoverable* errors (busy/locked database, transient I/O)
//! are retried with backoff and surfaced as [`Error::RetryExhausted`] once
//! the budget runs out.

use thiserror::Error;

/// All possible errors that can occur in reel-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("record not found: {id} in store '{store}'")]
    RecordNotFound { store: String, id: String },

    #[error("unknown store: '{0}'\n  hint: valid stores are: generations, projects, models")]
    UnknownStore(String),

    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error(
        "schema version mismatch: database is v{found}, this build supports up to v{supported}"
    )]
    SchemaMismatch { found: i32, supported: i32 },

    #[error("{name} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        name: String,
        attempts: u32,
        source: Box<Error>,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

impl Error {
    /// Returns true if this error must never be retried.
    ///
    /// Fatal errors describe conditions a retry cannot change: the disk is
    /// full, the database was written by a newer build, or the caller named
    /// a store that does not exist in the schema.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::QuotaExceeded(_) | Error::SchemaMismatch { .. } | Error::UnknownStore(_) => {
                true
            }
            Error::Database(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::DiskFull
                    || e.code == rusqlite::ErrorCode::ReadOnly
                    || e.code == rusqlite::ErrorCode::NotADatabase
            }
            _ => false,
        }
    }

    /// Returns true if this error is transient and worth retrying.
    ///
    /// Covers contention on the database file and interrupted I/O. Anything
    /// neither recoverable nor fatal (bad JSON, missing record) surfaces
    /// immediately without retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::SystemIoFailure
            ),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// A specialized Result type for reel-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
