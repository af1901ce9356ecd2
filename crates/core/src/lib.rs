// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! reel-core: Shared foundation for the reel persistence core
//!
//! This crate provides the data structures and durable storage primitives
//! used by the sync engine, the task tracker, and the backup service: the
//! SQLite record store with its retry executor and repair pass, and the
//! JSONL-backed queue and task stores that live outside the database's
//! failure domain.

pub mod clock;
pub mod error;
pub mod ids;
pub mod integrity;
pub mod jsonl;
pub mod paths;
pub mod queue;
pub mod record;
pub mod store;
pub mod task;

pub use clock::{ClockSource, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use ids::generate_id;
pub use integrity::{IntegrityReport, RepairReport};
pub use queue::{EntryStatus, Operation, QueueEntry, QueueStats, QueueStore};
pub use record::Record;
pub use store::{is_known_store, Database, KNOWN_STORES};
pub use task::{FailureKind, PendingTask, TaskStatus, TaskStore};
