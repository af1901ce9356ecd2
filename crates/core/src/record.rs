// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The domain record persisted by the local store.
//!
//! A [`Record`] is one domain entity — a generation run, a project, a
//! trained model. The core never interprets the payload; it is an opaque
//! JSON document owned by the application layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A domain entity persisted in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier within its store (format: `{prefix}-{hash}`).
    pub id: String,
    /// When the entity was created.
    pub created_at: DateTime<Utc>,
    /// When the entity was last written.
    pub updated_at: DateTime<Utc>,
    /// Opaque domain payload.
    pub payload: Value,
}

impl Record {
    /// Creates a new record stamped with the given time.
    pub fn new(id: impl Into<String>, payload: Value, now: DateTime<Utc>) -> Self {
        Record {
            id: id.into(),
            created_at: now,
            updated_at: now,
            payload,
        }
    }

    /// Marks the record as written at the given time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
