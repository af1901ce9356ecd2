// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Compute backend abstraction.
//!
//! The tracker never talks to the compute backend directly; the caller
//! supplies a [`TaskBackend`] implementation wrapping whatever provider it
//! targets. Submission returns an opaque handle; status is observed by
//! polling that handle. Payload shapes are entirely the implementation's
//! concern.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

/// Error type for compute backend operations.
///
/// A `poll` error means the job could not be *observed* — the job itself
/// may still be running. Job failure is reported in-band through
/// [`PollStatus::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Status of an external job as reported by one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// Still executing. Progress, when reported, is 0.0 ..= 1.0.
    Running { progress: Option<f32> },
    /// Finished successfully with a result payload.
    Completed { output: Value },
    /// The job itself failed on the backend.
    Failed { error: String },
}

/// Caller-supplied access to the compute backend.
pub trait TaskBackend: Send + Sync {
    /// Submit a job. Returns the handle assigned by the backend.
    ///
    /// Submission is non-idempotent: a retry may start (and bill) a second
    /// job. The tracker invokes this exactly once per task.
    fn submit(
        &self,
        task_type: &str,
        params: &Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, BackendError>> + Send + '_>>;

    /// Poll a job's status by handle.
    fn poll(
        &self,
        handle: &str,
    ) -> Pin<Box<dyn Future<Output = Result<PollStatus, BackendError>> + Send + '_>>;

    /// Request cancellation of a job. Best-effort; the default does
    /// nothing.
    fn cancel(
        &self,
        handle: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        let _ = handle;
        Box::pin(async { Ok(()) })
    }
}
