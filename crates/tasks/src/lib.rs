// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Long-running task tracker for the reel persistence core.
//!
//! Tracks jobs executing on a third-party compute backend over minutes —
//! LoRA training runs, photoset generations, motion renders. Every state
//! transition is persisted before the side-effecting action it precedes, so
//! a reload or crash leaves each task resumable from its last durably
//! written state.
//!
//! # Resumption rules
//!
//! - A task holding a backend handle (`in_progress`/`polling`) re-enters
//!   polling with that handle. The initial submission is never re-invoked:
//!   it is non-idempotent and would duplicate billable external work.
//! - A task without a handle cannot be resumed and is finalized `failed`
//!   with a no-handle cause; continuing it requires an explicit new request.

mod backend;
mod tracker;

pub use backend::{BackendError, PollStatus, TaskBackend};
pub use tracker::{TaskError, TaskTracker, TrackerConfig};

#[cfg(test)]
mod test_helpers;


#[cfg(test)]
mod tracker_tests;
