// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote apply abstraction.
//!
//! The core never talks to the remote backend directly. The caller registers
//! one [`RemoteApply`] implementation per entity type; the sync engine
//! invokes it opaquely per queue entry. Serialization and wire format are
//! entirely the implementation's concern.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use reel_core::QueueEntry;

/// Error type for remote apply operations.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The backend could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The backend rejected the mutation.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Result of applying one queue entry against the remote backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The mutation was accepted.
    Acknowledged,
    /// The remote holds a version that changed since this mutation was
    /// enqueued. Carries the remote's last-write timestamp so the engine
    /// can arbitrate by policy.
    Conflict { remote_updated_at: DateTime<Utc> },
}

/// Entity-specific remote application, supplied by the caller.
///
/// Implementations must be safe to invoke concurrently: entries within one
/// batch are applied with no ordering guarantee between them.
pub trait RemoteApply: Send + Sync {
    /// Apply a queued mutation to the remote backend.
    fn apply(
        &self,
        entry: &QueueEntry,
    ) -> Pin<Box<dyn Future<Output = Result<ApplyOutcome, ApplyError>> + Send + '_>>;

    /// Force the local snapshot onto the remote, overriding the conflicting
    /// remote version. Called when conflict arbitration picks the local
    /// side.
    fn overwrite(
        &self,
        entry: &QueueEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApplyError>> + Send + '_>>;
}
