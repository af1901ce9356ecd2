// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Observable sync state.
//!
//! [`SyncState`] is derived from the queue on every mutation and pushed
//! synchronously to subscribers. Subscribing returns a [`SubscriberId`]
//! handle used to unsubscribe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A snapshot of the sync engine's externally visible state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncState {
    /// Whether the engine believes the backend is reachable.
    pub is_online: bool,
    /// Whether a drain is currently in flight.
    pub is_syncing: bool,
    /// Entries waiting for a drain.
    pub pending_count: usize,
    /// Entries parked after exhausting retries.
    pub failed_count: usize,
    /// When the last drain finished.
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Listener = Box<dyn Fn(&SyncState) + Send + Sync>;

/// Registry of state-change listeners.
pub(crate) struct Listeners {
    inner: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl Listeners {
    pub(crate) fn new() -> Self {
        Listeners {
            inner: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener and returns its handle.
    pub(crate) fn subscribe(
        &self,
        listener: impl Fn(&SyncState) + Send + Sync + 'static,
    ) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.push((id, Box::new(listener)));
        SubscriberId(id)
    }

    /// Removes a listener. Returns true if it was registered.
    pub(crate) fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = inner.len();
        inner.retain(|(lid, _)| *lid != id.0);
        inner.len() != before
    }

    /// Pushes a state snapshot to every listener, synchronously.
    pub(crate) fn notify(&self, state: &SyncState) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for (_, listener) in inner.iter() {
            listener(state);
        }
    }
}
