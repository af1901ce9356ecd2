// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline mutation queue persistence.
//!
//! Pending entity mutations destined for the remote backend are stored as
//! JSONL, one entry per line, fsynced on enqueue so an immediate crash still
//! retains the mutation intent. The queue file is deliberately separate from
//! the SQLite record store: a store-level corruption that forces a
//! restore-from-backup never loses in-flight sync intents.
//!
//! Status changes rewrite the file atomically. Entries left `syncing` by a
//! crashed drain are reset to `pending` when the store is opened.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::jsonl;

/// The kind of entity mutation a queue entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for a drain.
    Pending,
    /// Claimed by the drain currently in flight.
    Syncing,
    /// Acknowledged by the remote backend; pruned at the next rewrite.
    Completed,
    /// Retries exhausted; kept until explicitly cleared.
    Failed,
    /// Flagged for manual conflict resolution; never auto-resolved.
    Conflict,
}

impl EntryStatus {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Syncing => "syncing",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
            EntryStatus::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A pending entity mutation destined for the remote backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique entry identifier.
    pub id: String,
    /// Entity type the mutation applies to (e.g. "generation").
    pub entity_type: String,
    /// The mutation kind.
    pub operation: Operation,
    /// Local id of the mutated record.
    pub local_id: String,
    /// Snapshot of the record payload at enqueue time.
    pub payload: Value,
    /// When the mutation happened locally.
    pub timestamp: DateTime<Utc>,
    /// Failed drain attempts so far. Monotonically increasing.
    pub retry_count: u32,
    /// Attempt bound; the entry parks `failed` when `retry_count` reaches it.
    pub max_retries: u32,
    /// Lifecycle status.
    pub status: EntryStatus,
    /// Last failure message, if any.
    pub error: Option<String>,
}

impl QueueEntry {
    /// Creates a new pending entry.
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        operation: Operation,
        local_id: impl Into<String>,
        payload: Value,
        timestamp: DateTime<Utc>,
        max_retries: u32,
    ) -> Self {
        QueueEntry {
            id: id.into(),
            entity_type: entity_type.into(),
            operation,
            local_id: local_id.into(),
            payload,
            timestamp,
            retry_count: 0,
            max_retries,
            status: EntryStatus::Pending,
            error: None,
        }
    }

    /// Records one failed drain attempt.
    ///
    /// Increments the retry count and re-marks the entry `pending` until the
    /// bound is reached, at which point it parks `failed`.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.error = Some(error.into());
        self.status = if self.retry_count >= self.max_retries {
            EntryStatus::Failed
        } else {
            EntryStatus::Pending
        };
    }

    /// Marks the entry acknowledged by the remote backend.
    pub fn complete(&mut self) {
        self.status = EntryStatus::Completed;
        self.error = None;
    }

    /// Flags the entry for manual conflict resolution.
    pub fn flag_conflict(&mut self, detail: impl Into<String>) {
        self.status = EntryStatus::Conflict;
        self.error = Some(detail.into());
    }
}

/// Derived counts over the queue, recomputed on every mutation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub syncing: usize,
    pub failed: usize,
    pub conflict: usize,
    pub total: usize,
}

/// Persisted offline mutation queue.
///
/// Entries are stored in a JSONL file, one entry per line. Appends are
/// fsynced; updates rewrite the file atomically.
pub struct QueueStore {
    /// Path to the queue file.
    path: PathBuf,
}

impl QueueStore {
    /// Create or open a queue store at the given path.
    ///
    /// Entries left `syncing` by a crashed drain are reset to `pending` so
    /// they rejoin the next drain.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Ensure the file exists (create if not)
        OpenOptions::new().create(true).append(true).open(path)?;

        let mut store = QueueStore {
            path: path.to_path_buf(),
        };
        store.reset_in_flight()?;
        Ok(store)
    }

    /// Resets `syncing` entries back to `pending`.
    ///
    /// Called on open to recover entries claimed by a crashed drain, and by
    /// the engine when a drain aborts mid-batch. Returns how many entries
    /// were reset.
    pub fn reset_in_flight(&mut self) -> Result<usize> {
        let mut entries = self.load_all()?;
        let mut reset = 0;
        for entry in &mut entries {
            if entry.status == EntryStatus::Syncing {
                entry.status = EntryStatus::Pending;
                reset += 1;
            }
        }
        if reset > 0 {
            jsonl::write_all(&self.path, &entries)?;
        }
        Ok(reset)
    }

    /// Appends an entry, persisted before this call returns.
    pub fn append(&mut self, entry: &QueueEntry) -> Result<()> {
        jsonl::append(&self.path, entry)
    }

    /// Reads all entries in insertion order.
    pub fn load_all(&self) -> Result<Vec<QueueEntry>> {
        jsonl::read_all(&self.path)
    }

    /// Reads entries eligible for a drain, oldest first.
    pub fn load_pending(&self) -> Result<Vec<QueueEntry>> {
        let mut pending: Vec<QueueEntry> = self
            .load_all()?
            .into_iter()
            .filter(|e| e.status == EntryStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(pending)
    }

    /// Gets an entry by id.
    pub fn get(&self, id: &str) -> Result<Option<QueueEntry>> {
        Ok(self.load_all()?.into_iter().find(|e| e.id == id))
    }

    /// Applies updated entries by id, pruning any marked `completed`.
    ///
    /// The whole file is rewritten atomically so a crash mid-update leaves
    /// the previous state intact.
    pub fn apply_updates(&mut self, updated: &[QueueEntry]) -> Result<()> {
        let mut entries = self.load_all()?;
        for entry in &mut entries {
            if let Some(new) = updated.iter().find(|u| u.id == entry.id) {
                *entry = new.clone();
            }
        }
        entries.retain(|e| e.status != EntryStatus::Completed);
        jsonl::write_all(&self.path, &entries)
    }

    /// Removes an entry by id. Returns true if it existed.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let entries = self.load_all()?;
        let remaining: Vec<QueueEntry> =
            entries.iter().filter(|e| e.id != id).cloned().collect();
        let removed = remaining.len() != entries.len();
        if removed {
            jsonl::write_all(&self.path, &remaining)?;
        }
        Ok(removed)
    }

    /// Removes all `failed` entries. Returns how many were cleared.
    pub fn clear_failed(&mut self) -> Result<usize> {
        let entries = self.load_all()?;
        let remaining: Vec<QueueEntry> = entries
            .iter()
            .filter(|e| e.status != EntryStatus::Failed)
            .cloned()
            .collect();
        let cleared = entries.len() - remaining.len();
        if cleared > 0 {
            jsonl::write_all(&self.path, &remaining)?;
        }
        Ok(cleared)
    }

    /// Derived counts over the current entries.
    pub fn stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats::default();
        for entry in self.load_all()? {
            stats.total += 1;
            match entry.status {
                EntryStatus::Pending => stats.pending += 1,
                EntryStatus::Syncing => stats.syncing += 1,
                EntryStatus::Failed => stats.failed += 1,
                EntryStatus::Conflict => stats.conflict += 1,
                EntryStatus::Completed => {}
            }
        }
        Ok(stats)
    }

    /// Number of entries currently persisted.
    pub fn len(&self) -> Result<usize> {
        Ok(self.load_all()?.len())
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Path to the queue file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
