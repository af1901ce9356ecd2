// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for task tracker tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use reel_core::TaskStore;

use crate::backend::{BackendError, PollStatus, TaskBackend};
use crate::tracker::{TaskTracker, TrackerConfig};

/// One scripted poll response.
#[derive(Debug, Clone)]
pub enum ScriptedPoll {
    Running(Option<f32>),
    Completed(Value),
    Failed(String),
    Transport(String),
}

impl ScriptedPoll {
    fn into_result(self) -> Result<PollStatus, BackendError> {
        match self {
            ScriptedPoll::Running(progress) => Ok(PollStatus::Running { progress }),
            ScriptedPoll::Completed(output) => Ok(PollStatus::Completed { output }),
            ScriptedPoll::Failed(error) => Ok(PollStatus::Failed { error }),
            ScriptedPoll::Transport(msg) => Err(BackendError::Transport(msg)),
        }
    }
}

/// Mock compute backend with scripted poll responses and call counters.
pub struct MockBackend {
    submit_result: Mutex<Result<String, String>>,
    polls: Mutex<VecDeque<ScriptedPoll>>,
    /// Response once the script is exhausted.
    idle: Mutex<ScriptedPoll>,
    pub submit_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
}

impl MockBackend {
    /// A backend whose submit returns the given handle.
    pub fn new(handle: &str) -> Arc<Self> {
        Arc::new(MockBackend {
            submit_result: Mutex::new(Ok(handle.to_string())),
            polls: Mutex::new(VecDeque::new()),
            idle: Mutex::new(ScriptedPoll::Running(None)),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        })
    }

    /// A backend whose submit is rejected.
    pub fn rejecting(message: &str) -> Arc<Self> {
        let backend = MockBackend::new("unused");
        *backend.submit_result.lock().unwrap() = Err(message.to_string());
        backend
    }

    /// Appends scripted poll responses, consumed in order.
    pub fn script_polls(&self, responses: impl IntoIterator<Item = ScriptedPoll>) {
        self.polls.lock().unwrap().extend(responses);
    }

    /// Sets the response returned once the script is exhausted.
    pub fn set_idle(&self, response: ScriptedPoll) {
        *self.idle.lock().unwrap() = response;
    }

    pub fn submit_count(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

impl TaskBackend for MockBackend {
    fn submit(
        &self,
        _task_type: &str,
        _params: &Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send + '_>> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.submit_result.lock().unwrap().clone();
        Box::pin(async move { result.map_err(BackendError::Rejected) })
    }

    fn poll(
        &self,
        _handle: &str,
    ) -> Pin<Box<dyn Future<Output = Result<PollStatus, BackendError>> + Send + '_>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut polls = self.polls.lock().unwrap();
            polls
                .pop_front()
                .unwrap_or_else(|| self.idle.lock().unwrap().clone())
        };
        Box::pin(async move { next.into_result() })
    }

    fn cancel(
        &self,
        _handle: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

/// A config with a millisecond poll interval so tests finish fast.
pub fn fast_config() -> TrackerConfig {
    TrackerConfig {
        poll_interval: Duration::from_millis(1),
        max_poll_attempts: 200,
        transport_failure_threshold: 15,
    }
}

/// Builds a tracker over a temp task store.
pub fn make_tracker(dir: &TempDir, backend: Arc<MockBackend>, config: TrackerConfig) -> TaskTracker {
    let store = TaskStore::open(&dir.path().join("tasks.jsonl")).unwrap();
    TaskTracker::new(store, backend, config)
}
