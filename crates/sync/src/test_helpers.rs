// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync engine tests.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reel_core::QueueStore;

use crate::apply::{ApplyError, ApplyOutcome, RemoteApply};
use crate::engine::{SyncConfig, SyncEngine};

/// Scripted behavior for the mock applier.
#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    /// Every apply is acknowledged.
    Succeed,
    /// Every apply fails with a network error.
    Fail,
    /// Every apply reports a conflict with the given remote timestamp.
    Conflict(DateTime<Utc>),
}

/// Mock remote applier with call counters.
pub struct MockApplier {
    behavior: Mutex<MockBehavior>,
    /// Artificial latency per apply, to widen race windows in tests.
    delay: Mutex<Duration>,
    pub apply_calls: AtomicUsize,
    pub overwrite_calls: AtomicUsize,
}

impl MockApplier {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(MockApplier {
            behavior: Mutex::new(behavior),
            delay: Mutex::new(Duration::ZERO),
            apply_calls: AtomicUsize::new(0),
            overwrite_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn apply_count(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn overwrite_count(&self) -> usize {
        self.overwrite_calls.load(Ordering::SeqCst)
    }
}

impl RemoteApply for MockApplier {
    fn apply(
        &self,
        _entry: &reel_core::QueueEntry,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<ApplyOutcome, ApplyError>> + Send + '_>,
    > {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        let delay = *self.delay.lock().unwrap();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match behavior {
                MockBehavior::Succeed => Ok(ApplyOutcome::Acknowledged),
                MockBehavior::Fail => Err(ApplyError::Network("connection refused".to_string())),
                MockBehavior::Conflict(remote_updated_at) => {
                    Ok(ApplyOutcome::Conflict { remote_updated_at })
                }
            }
        })
    }

    fn overwrite(
        &self,
        _entry: &reel_core::QueueEntry,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ApplyError>> + Send + '_>>
    {
        self.overwrite_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

/// Builds an online engine over a temp queue with the mock applier
/// registered for the "generation" entity type.
pub fn make_engine(
    dir: &tempfile::TempDir,
    config: SyncConfig,
    applier: Arc<MockApplier>,
) -> Arc<SyncEngine> {
    let queue = QueueStore::open(&dir.path().join("queue.jsonl")).unwrap();
    let mut engine = SyncEngine::new(queue, config);
    engine.register("generation", applier);
    let engine = Arc::new(engine);
    engine.set_online(true);
    engine
}

/// A config with opportunistic drains disabled, so tests drive every drain
/// explicitly.
pub fn manual_config() -> SyncConfig {
    SyncConfig {
        auto_drain: false,
        ..SyncConfig::default()
    }
}
