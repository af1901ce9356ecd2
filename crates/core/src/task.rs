// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted state for long-running external compute jobs.
//!
//! A [`PendingTask`] tracks one job (a LoRA training run, a photoset
//! generation, a motion render) executing on a third-party compute backend
//! over minutes. The [`TaskStore`] is an append-only JSONL log: every state
//! transition is appended with fsync *before* the side-effecting action it
//! precedes, so a crash leaves the task resumable from the last durably
//! written state. On load, the latest line per request id wins; the log is
//! compacted to one line per task when the store is opened.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::jsonl;

/// Lifecycle status of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Intent recorded; submission not yet confirmed.
    Queued,
    /// Accepted by the backend; handle assigned.
    InProgress,
    /// Being polled for progress.
    Polling,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully; see the failure kind for the cause.
    Failed,
}

impl TaskStatus {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Polling => "polling",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The persisted cause of a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The non-idempotent initial submission failed. Never auto-retried.
    Submission,
    /// Polling could not reach the backend for too many consecutive
    /// attempts. Distinct from the job itself failing.
    ObservabilityLoss,
    /// The external job reported failure.
    Job,
    /// The task failed before a handle was assigned; nothing to resume.
    NoHandle,
    /// The poll-attempt ceiling was reached.
    Timeout,
    /// Cancelled by the caller.
    Cancelled,
}

impl FailureKind {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Submission => "submission",
            FailureKind::ObservabilityLoss => "observability_loss",
            FailureKind::Job => "job",
            FailureKind::NoHandle => "no_handle",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One long-running job tracked by handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTask {
    /// Locally generated request identifier (the storage key).
    pub request_id: String,
    /// Handle assigned by the compute backend. Assigned once; required to
    /// resume polling after a reload.
    pub external_id: Option<String>,
    /// Job kind, opaque to the core (e.g. "lora_training").
    pub task_type: String,
    /// Submission parameters, opaque to the core.
    pub params: Value,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Reported progress, 0.0 ..= 1.0.
    pub progress: f32,
    /// Consecutive poll transport failures. Reset by a successful poll.
    pub retry_count: u32,
    /// Transport-failure threshold before the task is abandoned.
    pub max_retries: u32,
    /// Final result payload, once completed.
    pub output: Option<Value>,
    /// Cause of failure, once failed.
    pub failure: Option<FailureKind>,
    /// Human-readable failure detail.
    pub error: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task state last changed.
    pub updated_at: DateTime<Utc>,
}

impl PendingTask {
    /// Creates a new queued task.
    pub fn new(
        request_id: impl Into<String>,
        task_type: impl Into<String>,
        params: Value,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        PendingTask {
            request_id: request_id.into(),
            external_id: None,
            task_type: task_type.into(),
            params,
            status: TaskStatus::Queued,
            progress: 0.0,
            retry_count: 0,
            max_retries,
            output: None,
            failure: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records the handle returned by the backend.
    pub fn assign_handle(&mut self, handle: impl Into<String>, now: DateTime<Utc>) {
        self.external_id = Some(handle.into());
        self.status = TaskStatus::InProgress;
        self.updated_at = now;
    }

    /// Enters the polling state.
    pub fn begin_polling(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Polling;
        self.updated_at = now;
    }

    /// Records observed progress and clears the consecutive-failure streak.
    pub fn observe_progress(&mut self, progress: f32, now: DateTime<Utc>) {
        self.progress = progress.clamp(0.0, 1.0);
        self.retry_count = 0;
        self.updated_at = now;
    }

    /// Records one consecutive poll transport failure.
    pub fn record_poll_failure(&mut self, now: DateTime<Utc>) {
        self.retry_count += 1;
        self.updated_at = now;
    }

    /// Returns true if the consecutive-failure streak has hit the threshold.
    pub fn observability_lost(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Finalizes the task as completed.
    pub fn complete(&mut self, output: Value, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.progress = 1.0;
        self.output = Some(output);
        self.updated_at = now;
    }

    /// Finalizes the task as failed with the given cause.
    pub fn fail(&mut self, kind: FailureKind, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.failure = Some(kind);
        self.error = Some(error.into());
        self.updated_at = now;
    }

    /// Returns true if the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if the task can re-enter polling after a reload.
    ///
    /// Resumption requires a valid handle; a non-terminal task without one
    /// can only be finalized.
    pub fn is_resumable(&self) -> bool {
        matches!(self.status, TaskStatus::InProgress | TaskStatus::Polling)
            && self.external_id.is_some()
    }
}

/// Append-only persisted log of task state transitions.
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    /// Create or open a task store at the given path.
    ///
    /// Compacts the log to one line per task.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut store = TaskStore {
            path: path.to_path_buf(),
        };
        store.compact()?;
        Ok(store)
    }

    /// Appends the task's current state, persisted before this call returns.
    ///
    /// Callers append the new state *before* performing the side effect the
    /// transition describes (submit, poll).
    pub fn persist(&mut self, task: &PendingTask) -> Result<()> {
        jsonl::append(&self.path, task)
    }

    /// Loads the latest state of every task, oldest first.
    pub fn load_all(&self) -> Result<Vec<PendingTask>> {
        let lines: Vec<PendingTask> = jsonl::read_all(&self.path)?;

        // replay: the last appended state per request id wins
        let mut latest: Vec<PendingTask> = Vec::new();
        for task in lines {
            if let Some(existing) = latest.iter_mut().find(|t| t.request_id == task.request_id)
            {
                *existing = task;
            } else {
                latest.push(task);
            }
        }

        latest.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(latest)
    }

    /// Gets the latest state of a task by request id.
    pub fn get(&self, request_id: &str) -> Result<Option<PendingTask>> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|t| t.request_id == request_id))
    }

    /// Rewrites the log to one line per task.
    pub fn compact(&mut self) -> Result<()> {
        let latest = self.load_all()?;
        if self.path.exists() {
            jsonl::write_all(&self.path, &latest)?;
        }
        Ok(())
    }

    /// Removes a task from the log entirely. Returns true if it existed.
    pub fn remove(&mut self, request_id: &str) -> Result<bool> {
        let tasks = self.load_all()?;
        let remaining: Vec<PendingTask> = tasks
            .iter()
            .filter(|t| t.request_id != request_id)
            .cloned()
            .collect();
        let removed = remaining.len() != tasks.len();
        if removed {
            jsonl::write_all(&self.path, &remaining)?;
        }
        Ok(removed)
    }

    /// Path to the task log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
