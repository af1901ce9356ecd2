// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Integrity and backup service for the reel persistence core.
//!
//! Exports the full record store into timestamped snapshot files in a
//! secondary, independently addressable location on a fixed interval, and
//! restores them by replaying every record through the store's write path.
//! Snapshots exist only for disaster recovery; live reads never touch them.

mod service;
mod snapshot;

pub use service::{BackupConfig, BackupError, BackupService};
pub use snapshot::{BackupSnapshot, SnapshotStore, SNAPSHOT_VERSION};

#[cfg(test)]
mod service_tests;
