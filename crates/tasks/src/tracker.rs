// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The long-running task tracker.
//!
//! State machine: `queued → in_progress (handle assigned) → polling →
//! {completed | failed}`. Transitions are appended to the task store with
//! fsync *before* the side effect they precede: the queued intent is
//! durable before `submit`, the polling state (with its handle) is durable
//! before the first poll.
//!
//! Terminal job failures are recorded in persisted state and returned as a
//! finalized task, not as an `Err` — errors are reserved for local faults
//! (store I/O, unknown request id).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use reel_core::{
    generate_id, ClockSource, FailureKind, PendingTask, SystemClock, TaskStatus, TaskStore,
};

use crate::backend::{PollStatus, TaskBackend};

/// Error type for tracker operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// No task with this request id.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The task's run loop is already active in this process.
    #[error("task is already running: {0}")]
    AlreadyRunning(String),

    /// Task store failure.
    #[error("task store error: {0}")]
    Store(#[from] reel_core::Error),
}

/// Result type for tracker operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Configuration for the task tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Fixed delay between polls.
    pub poll_interval: Duration,
    /// Hard ceiling on total poll attempts per run. On hitting it the
    /// external job is cancelled best-effort and the task finalizes
    /// `failed`/`timeout`.
    pub max_poll_attempts: u32,
    /// Consecutive poll transport failures tolerated before the task is
    /// abandoned `failed`/`observability_loss`.
    pub transport_failure_threshold: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 720,
            transport_failure_threshold: 15,
        }
    }
}

/// Tracks long-running external jobs across reloads and crashes.
///
/// Constructed explicitly with an injected store, backend, and clock.
pub struct TaskTracker {
    store: Mutex<TaskStore>,
    backend: Arc<dyn TaskBackend>,
    config: TrackerConfig,
    clock: Arc<dyn ClockSource>,
    /// Cancellation flags for run loops active in this process.
    running: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl TaskTracker {
    /// Creates a tracker over the given store and backend.
    pub fn new(store: TaskStore, backend: Arc<dyn TaskBackend>, config: TrackerConfig) -> Self {
        TaskTracker {
            store: Mutex::new(store),
            backend,
            config,
            clock: Arc::new(SystemClock),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the clock (for testing).
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    fn persist(&self, task: &PendingTask) -> TaskResult<()> {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        store.persist(task)?;
        Ok(())
    }

    /// Records a new task as a durable `queued` intent and returns it.
    ///
    /// Nothing is submitted yet; call [`TaskTracker::run`] to drive the
    /// task to a terminal state.
    pub fn create(&self, task_type: impl Into<String>, params: Value) -> TaskResult<PendingTask> {
        let task = PendingTask::new(
            generate_id("task"),
            task_type,
            params,
            self.config.transport_failure_threshold,
            self.clock.now(),
        );
        self.persist(&task)?;
        Ok(task)
    }

    /// Latest persisted state of a task.
    pub fn get(&self, request_id: &str) -> TaskResult<Option<PendingTask>> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        Ok(store.get(request_id)?)
    }

    /// Latest persisted state of every task, oldest first.
    pub fn tasks(&self) -> TaskResult<Vec<PendingTask>> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        Ok(store.load_all()?)
    }

    /// Drives a task to a terminal state and returns it.
    ///
    /// A `queued` task is submitted first; a task that already holds a
    /// handle resumes polling without re-submitting. Returns immediately if
    /// the task is already terminal.
    pub async fn run(&self, request_id: &str) -> TaskResult<PendingTask> {
        let task = self
            .get(request_id)?
            .ok_or_else(|| TaskError::NotFound(request_id.to_string()))?;
        if task.is_terminal() {
            return Ok(task);
        }

        let cancel = {
            let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            if running.contains_key(request_id) {
                return Err(TaskError::AlreadyRunning(request_id.to_string()));
            }
            let flag = Arc::new(AtomicBool::new(false));
            running.insert(request_id.to_string(), Arc::clone(&flag));
            flag
        };

        let result = self.drive(task, &cancel).await;

        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(request_id);
        result
    }

    async fn drive(
        &self,
        mut task: PendingTask,
        cancel: &AtomicBool,
    ) -> TaskResult<PendingTask> {
        if task.status == TaskStatus::Queued && task.external_id.is_none() {
            // the queued intent is already durable; submit exactly once
            match self.backend.submit(&task.task_type, &task.params).await {
                Ok(handle) => {
                    tracing::info!(
                        task = task.request_id.as_str(),
                        handle = handle.as_str(),
                        "job accepted by backend"
                    );
                    task.assign_handle(handle, self.clock.now());
                    self.persist(&task)?;
                }
                Err(e) => {
                    // non-idempotent submission is never auto-retried
                    tracing::warn!(task = task.request_id.as_str(), "submission failed: {e}");
                    task.fail(FailureKind::Submission, e.to_string(), self.clock.now());
                    self.persist(&task)?;
                    return Ok(task);
                }
            }
        }

        let Some(handle) = task.external_id.clone() else {
            // cannot be resumed without a handle, terminal immediately
            task.fail(
                FailureKind::NoHandle,
                "no external handle assigned",
                self.clock.now(),
            );
            self.persist(&task)?;
            return Ok(task);
        };

        if task.status != TaskStatus::Polling {
            // durable before the first poll is issued
            task.begin_polling(self.clock.now());
            self.persist(&task)?;
        }

        let mut attempts: u32 = 0;
        loop {
            if cancel.load(Ordering::SeqCst) {
                if let Err(e) = self.backend.cancel(&handle).await {
                    tracing::warn!(
                        task = task.request_id.as_str(),
                        "backend cancel failed: {e}"
                    );
                }
                task.fail(FailureKind::Cancelled, "cancelled by caller", self.clock.now());
                self.persist(&task)?;
                return Ok(task);
            }

            if attempts >= self.config.max_poll_attempts {
                // cancel the external job so nothing keeps running unobserved
                if let Err(e) = self.backend.cancel(&handle).await {
                    tracing::warn!(
                        task = task.request_id.as_str(),
                        "backend cancel failed: {e}"
                    );
                }
                task.fail(
                    FailureKind::Timeout,
                    format!("no terminal status after {attempts} polls"),
                    self.clock.now(),
                );
                self.persist(&task)?;
                return Ok(task);
            }

            tokio::time::sleep(self.config.poll_interval).await;
            attempts += 1;

            match self.backend.poll(&handle).await {
                Ok(PollStatus::Running { progress }) => {
                    let progress = progress.unwrap_or(task.progress);
                    task.observe_progress(progress, self.clock.now());
                    self.persist(&task)?;
                }
                Ok(PollStatus::Completed { output }) => {
                    tracing::info!(task = task.request_id.as_str(), "job completed");
                    task.complete(output, self.clock.now());
                    self.persist(&task)?;
                    return Ok(task);
                }
                Ok(PollStatus::Failed { error }) => {
                    tracing::warn!(task = task.request_id.as_str(), "job failed: {error}");
                    task.fail(FailureKind::Job, error, self.clock.now());
                    self.persist(&task)?;
                    return Ok(task);
                }
                Err(e) => {
                    task.record_poll_failure(self.clock.now());
                    self.persist(&task)?;
                    tracing::debug!(
                        task = task.request_id.as_str(),
                        consecutive = task.retry_count,
                        "poll transport failure: {e}"
                    );
                    if task.observability_lost() {
                        task.fail(
                            FailureKind::ObservabilityLoss,
                            format!(
                                "lost contact after {} consecutive poll failures: {e}",
                                task.retry_count
                            ),
                            self.clock.now(),
                        );
                        self.persist(&task)?;
                        return Ok(task);
                    }
                }
            }
        }
    }

    /// Startup pass over persisted tasks.
    ///
    /// Returns the request ids that can re-enter polling (handle present).
    /// Non-terminal tasks without a handle are finalized
    /// `failed`/`no_handle`: the crash may have happened after a successful
    /// submit whose handle was lost, so re-submitting is not safe.
    pub fn resume_pending(&self) -> TaskResult<Vec<String>> {
        let tasks = {
            let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
            store.load_all()?
        };

        let mut resumable = Vec::new();
        for mut task in tasks {
            if task.is_terminal() {
                continue;
            }
            if task.is_resumable() {
                resumable.push(task.request_id.clone());
            } else {
                tracing::warn!(
                    task = task.request_id.as_str(),
                    "leftover task without handle finalized as failed"
                );
                task.fail(
                    FailureKind::NoHandle,
                    "no external handle assigned before shutdown",
                    self.clock.now(),
                );
                self.persist(&task)?;
            }
        }
        Ok(resumable)
    }

    /// Cancels a task.
    ///
    /// If its run loop is active in this process the loop finalizes it; an
    /// inactive task is finalized here directly, with a best-effort backend
    /// cancellation when a handle exists. Either way the task ends in a
    /// terminal state, never a dangling `polling` record.
    pub async fn cancel(&self, request_id: &str) -> TaskResult<PendingTask> {
        let task = self
            .get(request_id)?
            .ok_or_else(|| TaskError::NotFound(request_id.to_string()))?;
        if task.is_terminal() {
            return Ok(task);
        }

        let active = {
            let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            running.get(request_id).cloned()
        };
        if let Some(flag) = active {
            flag.store(true, Ordering::SeqCst);
            return Ok(task);
        }

        if let Some(handle) = &task.external_id {
            if let Err(e) = self.backend.cancel(handle).await {
                tracing::warn!(task = request_id, "backend cancel failed: {e}");
            }
        }

        let mut task = task;
        task.fail(FailureKind::Cancelled, "cancelled by caller", self.clock.now());
        self.persist(&task)?;
        Ok(task)
    }
}
