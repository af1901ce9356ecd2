// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Integrity scanning and repair for the record store.
//!
//! [`Database::verify_integrity`] inspects raw rows without going through
//! the typed mappers, so records the mappers would reject are still seen.
//! [`Database::repair`] rewrites salvageable rows with deterministic
//! defaults (generated id, current timestamp, empty payload) and removes
//! rows belonging to stores absent from the current schema. Repair is
//! idempotent: running it twice leaves the second run with nothing to do.

use chrono::DateTime;
use rusqlite::params;

use crate::error::Result;
use crate::ids::generate_id;
use crate::store::{is_known_store, Database};

/// Counts of integrity violations found by a scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Total rows scanned.
    pub scanned: usize,
    /// Rows with an empty id.
    pub missing_id: usize,
    /// Rows with an unparseable created_at or updated_at.
    pub bad_timestamp: usize,
    /// Rows whose payload is not valid JSON.
    pub bad_payload: usize,
    /// Rows in stores absent from the current schema.
    pub unknown_store: usize,
}

impl IntegrityReport {
    /// Returns true if the scan found no violations.
    pub fn is_clean(&self) -> bool {
        self.missing_id == 0
            && self.bad_timestamp == 0
            && self.bad_payload == 0
            && self.unknown_store == 0
    }
}

/// Counts of rows touched by a repair pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    /// Rows rewritten with defaults.
    pub repaired: usize,
    /// Rows removed (unknown store).
    pub removed: usize,
}

/// One raw row as stored, before any typed parsing.
struct RawRow {
    rowid: i64,
    store: String,
    id: String,
    created_at: String,
    updated_at: String,
    payload: String,
}

impl RawRow {
    fn has_missing_id(&self) -> bool {
        self.id.trim().is_empty()
    }

    fn has_bad_timestamp(&self) -> bool {
        DateTime::parse_from_rfc3339(&self.created_at).is_err()
            || DateTime::parse_from_rfc3339(&self.updated_at).is_err()
    }

    fn has_bad_payload(&self) -> bool {
        serde_json::from_str::<serde_json::Value>(&self.payload).is_err()
    }

    fn in_unknown_store(&self) -> bool {
        !is_known_store(&self.store)
    }

    fn is_damaged(&self) -> bool {
        self.has_missing_id()
            || self.has_bad_timestamp()
            || self.has_bad_payload()
            || self.in_unknown_store()
    }
}

fn id_prefix(store: &str) -> &'static str {
    match store {
        "generations" => "gen",
        "projects" => "proj",
        "models" => "model",
        _ => "rec",
    }
}

impl Database {
    fn raw_rows(&self) -> Result<Vec<RawRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT rowid, store, id, created_at, updated_at, payload FROM records",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RawRow {
                    rowid: row.get(0)?,
                    store: row.get(1)?,
                    id: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                    payload: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Scans all records for missing required fields and schema drift.
    pub fn verify_integrity(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();

        for row in self.raw_rows()? {
            report.scanned += 1;
            if row.in_unknown_store() {
                report.unknown_store += 1;
                continue;
            }
            if row.has_missing_id() {
                report.missing_id += 1;
            }
            if row.has_bad_timestamp() {
                report.bad_timestamp += 1;
            }
            if row.has_bad_payload() {
                report.bad_payload += 1;
            }
        }

        Ok(report)
    }

    /// Rewrites damaged rows with deterministic defaults.
    ///
    /// Missing ids are regenerated, unparseable timestamps replaced with the
    /// current time, invalid payloads replaced with an empty object. Rows in
    /// unknown stores cannot be placed and are removed. Returns the counts
    /// of rows repaired and removed.
    pub fn repair(&mut self) -> Result<RepairReport> {
        let damaged: Vec<RawRow> = self
            .raw_rows()?
            .into_iter()
            .filter(RawRow::is_damaged)
            .collect();

        let mut report = RepairReport::default();
        if damaged.is_empty() {
            return Ok(report);
        }

        let now = self.clock().now().to_rfc3339();
        let tx = self.conn.transaction()?;

        for row in damaged {
            if row.in_unknown_store() {
                tx.execute("DELETE FROM records WHERE rowid = ?1", params![row.rowid])?;
                report.removed += 1;
                continue;
            }

            let id = if row.has_missing_id() {
                generate_id(id_prefix(&row.store))
            } else {
                row.id.clone()
            };
            let created_at = match DateTime::parse_from_rfc3339(&row.created_at) {
                Ok(_) => row.created_at.clone(),
                Err(_) => now.clone(),
            };
            let updated_at = match DateTime::parse_from_rfc3339(&row.updated_at) {
                Ok(_) => row.updated_at.clone(),
                Err(_) => now.clone(),
            };
            let payload = if row.has_bad_payload() {
                "{}".to_string()
            } else {
                row.payload.clone()
            };

            tx.execute(
                "UPDATE records SET id = ?1, created_at = ?2, updated_at = ?3, payload = ?4
                 WHERE rowid = ?5",
                params![id, created_at, updated_at, payload, row.rowid],
            )?;
            report.repaired += 1;
        }

        tx.commit()?;
        Ok(report)
    }
}

#[cfg(test)]
#[path = "integrity_tests.rs"]
mod tests;
