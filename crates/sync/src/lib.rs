// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote sync engine for the reel persistence core.
//!
//! Drains the offline mutation queue against the remote backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Application │────►│ SyncEngine  │────►│ RemoteApply │
//! │ (mutations) │◄────│  (drains)   │◄────│   (trait)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │
//!        │                   ▼
//! ┌─────────────┐     ┌─────────────┐
//! │ subscribers │     │ QueueStore  │  (JSONL, fsync)
//! │ (SyncState) │     └─────────────┘
//! └─────────────┘
//! ```
//!
//! # Features
//!
//! - Single-flight drains: at most one in flight, enforced before any await
//! - Ordered batches with bounded concurrent fan-out inside each batch
//! - Per-entry retry bookkeeping; exhausted entries park as `failed`
//! - Configurable conflict resolution, including manual with an explicit
//!   resolution call
//! - Opportunistic drains on enqueue and on the offline→online transition,
//!   with exponential backoff after failing drains
//! - Injectable appliers and clock for testing

mod apply;
mod engine;
mod state;

pub use apply::{ApplyError, ApplyOutcome, RemoteApply};
pub use engine::{ConflictStrategy, ResolveChoice, SyncConfig, SyncEngine, SyncError, SyncReport};
pub use state::{SubscriberId, SyncState};

#[cfg(test)]
mod test_helpers;
