// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for tracker state transitions and persistence discipline.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use reel_core::{FailureKind, TaskStatus, TaskStore};

use super::test_helpers::{fast_config, make_tracker, MockBackend, ScriptedPoll};
use super::tracker::{TaskError, TrackerConfig};

#[tokio::test]
async fn create_persists_queued_intent_durably() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::new("rp-91f2");
    let tracker = make_tracker(&dir, backend, fast_config());

    let task = tracker
        .create("lora_training", json!({"steps": 1500}))
        .unwrap();

    // visible to a fresh store before anything was submitted
    let store = TaskStore::open(&dir.path().join("tasks.jsonl")).unwrap();
    let persisted = store.get(&task.request_id).unwrap().unwrap();
    assert_eq!(persisted.status, TaskStatus::Queued);
    assert!(persisted.external_id.is_none());
}

#[tokio::test]
async fn run_drives_to_completion() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::new("rp-91f2");
    backend.script_polls([
        ScriptedPoll::Running(Some(0.3)),
        ScriptedPoll::Running(Some(0.8)),
        ScriptedPoll::Completed(json!({"images": ["r2://out/1.png"]})),
    ]);
    let tracker = make_tracker(&dir, Arc::clone(&backend), fast_config());

    let task = tracker.create("photoset_generation", json!({})).unwrap();
    let done = tracker.run(&task.request_id).await.unwrap();

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.external_id.as_deref(), Some("rp-91f2"));
    assert_eq!(done.output, Some(json!({"images": ["r2://out/1.png"]})));
    assert!((done.progress - 1.0).abs() < f32::EPSILON);
    assert_eq!(backend.submit_count(), 1);
}

#[tokio::test]
async fn job_failure_is_recorded_not_thrown() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::new("rp-91f2");
    backend.script_polls([ScriptedPoll::Failed("OOM on worker".to_string())]);
    let tracker = make_tracker(&dir, backend, fast_config());

    let task = tracker.create("lora_training", json!({})).unwrap();
    let done = tracker.run(&task.request_id).await.unwrap();

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.failure, Some(FailureKind::Job));
    assert_eq!(done.error.as_deref(), Some("OOM on worker"));
}

#[tokio::test]
async fn submission_failure_is_terminal_and_never_auto_retried() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::rejecting("invalid params");
    let tracker = make_tracker(&dir, Arc::clone(&backend), fast_config());

    let task = tracker.create("lora_training", json!({})).unwrap();
    let done = tracker.run(&task.request_id).await.unwrap();

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.failure, Some(FailureKind::Submission));
    assert_eq!(backend.submit_count(), 1);

    // a second run returns the terminal task without touching the backend
    let again = tracker.run(&task.request_id).await.unwrap();
    assert_eq!(again.status, TaskStatus::Failed);
    assert_eq!(backend.submit_count(), 1);
}

#[tokio::test]
async fn run_on_unknown_task_is_not_found() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::new("rp-91f2");
    let tracker = make_tracker(&dir, backend, fast_config());

    let err = tracker.run("task-missing0").await.unwrap_err();
    assert!(matches!(err, TaskError::NotFound(_)));
}

#[tokio::test]
async fn timeout_cancels_external_job_before_finalizing() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::new("rp-91f2");
    // idle response keeps reporting Running forever
    let config = TrackerConfig {
        poll_interval: Duration::from_millis(1),
        max_poll_attempts: 3,
        transport_failure_threshold: 15,
    };
    let tracker = make_tracker(&dir, Arc::clone(&backend), config);

    let task = tracker.create("motion_render", json!({})).unwrap();
    let done = tracker.run(&task.request_id).await.unwrap();

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.failure, Some(FailureKind::Timeout));
    assert_eq!(backend.poll_count(), 3);
    assert_eq!(backend.cancel_count(), 1);
}

#[tokio::test]
async fn cancel_finalizes_an_active_run() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::new("rp-91f2");
    let tracker = Arc::new(make_tracker(&dir, Arc::clone(&backend), fast_config()));

    let task = tracker.create("motion_render", json!({})).unwrap();
    let id = task.request_id.clone();

    let runner = {
        let tracker = Arc::clone(&tracker);
        let id = id.clone();
        tokio::spawn(async move { tracker.run(&id).await })
    };

    // let the run loop enter polling, then signal cancellation
    tokio::time::sleep(Duration::from_millis(20)).await;
    tracker.cancel(&id).await.unwrap();

    let done = runner.await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.failure, Some(FailureKind::Cancelled));
    assert_eq!(backend.cancel_count(), 1);

    // no dangling polling record
    let persisted = tracker.get(&id).unwrap().unwrap();
    assert!(persisted.is_terminal());
}

#[tokio::test]
async fn cancel_finalizes_an_inactive_task_directly() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::new("rp-91f2");
    let tracker = make_tracker(&dir, Arc::clone(&backend), fast_config());

    let task = tracker.create("motion_render", json!({})).unwrap();
    let done = tracker.cancel(&task.request_id).await.unwrap();

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.failure, Some(FailureKind::Cancelled));
    // no handle yet, so there was nothing to cancel on the backend
    assert_eq!(backend.cancel_count(), 0);
}

#[tokio::test]
async fn concurrent_run_is_rejected() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::new("rp-91f2");
    let tracker = Arc::new(make_tracker(&dir, backend, fast_config()));

    let task = tracker.create("motion_render", json!({})).unwrap();
    let id = task.request_id.clone();

    let runner = {
        let tracker = Arc::clone(&tracker);
        let id = id.clone();
        tokio::spawn(async move { tracker.run(&id).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    let err = tracker.run(&id).await.unwrap_err();
    assert!(matches!(err, TaskError::AlreadyRunning(_)));

    tracker.cancel(&id).await.unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn progress_updates_are_persisted_as_they_arrive() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::new("rp-91f2");
    backend.script_polls([
        ScriptedPoll::Running(Some(0.25)),
        ScriptedPoll::Completed(json!({})),
    ]);
    let tracker = make_tracker(&dir, backend, fast_config());

    let task = tracker.create("lora_training", json!({})).unwrap();
    tracker.run(&task.request_id).await.unwrap();

    // the log recorded the intermediate progress line before completion
    let raw = std::fs::read_to_string(dir.path().join("tasks.jsonl")).unwrap();
    assert!(raw.contains("0.25"));
}
