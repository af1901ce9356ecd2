// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The remote sync engine.
//!
//! Drains pending queue entries against the remote backend in ordered
//! batches. At most one drain is in flight at a time, enforced by a flag
//! checked and set synchronously before the first suspension point. Within
//! a batch, entries are applied concurrently with no relative ordering;
//! batch N+1 starts only after batch N finishes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::Value;

use reel_core::{
    generate_id, ClockSource, EntryStatus, Operation, QueueEntry, QueueStore, SystemClock,
};

use crate::apply::{ApplyError, ApplyOutcome, RemoteApply};
use crate::state::{Listeners, SubscriberId, SyncState};

/// Error type for sync engine operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Queue store failure.
    #[error("queue store error: {0}")]
    Store(#[from] reel_core::Error),

    /// The named entry does not exist.
    #[error("queue entry not found: {0}")]
    EntryNotFound(String),

    /// The named entry is not flagged `conflict`.
    #[error("queue entry is not in conflict: {0}")]
    NotConflicted(String),

    /// No applier is registered for the entity type.
    #[error("no applier registered for entity type '{0}'")]
    NoApplier(String),

    /// Remote apply failure during explicit conflict resolution.
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),
}

/// Result type for sync engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// How conflicting remote versions are arbitrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    /// The newer write wins, compared by timestamp.
    #[default]
    LastWriteWins,
    /// The local snapshot always wins.
    LocalWins,
    /// The remote version always wins; the local mutation is discarded.
    RemoteWins,
    /// Flag the entry `conflict` and wait for an explicit resolution.
    Manual,
}

/// Caller's decision when resolving a manual conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveChoice {
    /// Push the local snapshot to the remote.
    KeepLocal,
    /// Keep the remote version; discard the local mutation.
    AcceptRemote,
}

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Master switch; a disabled engine never drains.
    pub enabled: bool,
    /// Whether enqueue and the offline→online transition spawn
    /// opportunistic drains.
    pub auto_drain: bool,
    /// Entries applied concurrently per batch.
    pub batch_size: usize,
    /// Failed drain attempts before an entry parks `failed`.
    pub max_retries: u32,
    /// Conflict arbitration policy.
    pub conflict: ConflictStrategy,
    /// Base delay before an opportunistic drain after a failing drain.
    pub backoff_base: Duration,
    /// Ceiling for the opportunistic drain delay.
    pub backoff_max: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            enabled: true,
            auto_drain: true,
            batch_size: 10,
            max_retries: 3,
            conflict: ConflictStrategy::default(),
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(300),
        }
    }
}

/// Result of one drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries acknowledged (or conflict-resolved) this drain.
    pub success: usize,
    /// Entries that failed to apply this drain.
    pub failed: usize,
}

/// Outcome of applying a single entry.
enum EntryOutcome {
    /// Acknowledged; prune the entry.
    Completed,
    /// Failed; consume one retry.
    Failed(String),
    /// Failed with no chance of a retry succeeding; park immediately.
    Parked(String),
    /// Needs manual resolution.
    Conflict(String),
}

/// The remote sync engine.
///
/// Constructed explicitly with injected dependencies; wrap in an [`Arc`]
/// once the appliers are registered.
pub struct SyncEngine {
    queue: Mutex<QueueStore>,
    appliers: HashMap<String, Arc<dyn RemoteApply>>,
    config: SyncConfig,
    clock: Arc<dyn ClockSource>,
    online: AtomicBool,
    syncing: AtomicBool,
    drain_delay: Mutex<Duration>,
    last_sync_at: Mutex<Option<DateTime<Utc>>>,
    listeners: Listeners,
}

/// Clears the single-flight flag when a drain ends, however it ends.
struct DrainGuard<'a>(&'a SyncEngine);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.syncing.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    /// Creates an engine over the given queue store.
    pub fn new(queue: QueueStore, config: SyncConfig) -> Self {
        SyncEngine {
            queue: Mutex::new(queue),
            appliers: HashMap::new(),
            config,
            clock: Arc::new(SystemClock),
            online: AtomicBool::new(false),
            syncing: AtomicBool::new(false),
            drain_delay: Mutex::new(Duration::ZERO),
            last_sync_at: Mutex::new(None),
            listeners: Listeners::new(),
        }
    }

    /// Replaces the clock (for testing).
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers the applier for an entity type.
    ///
    /// Entries of an unregistered type park `failed` when drained.
    pub fn register(&mut self, entity_type: impl Into<String>, applier: Arc<dyn RemoteApply>) {
        self.appliers.insert(entity_type.into(), applier);
    }

    /// Subscribes to sync-state changes. State is pushed synchronously
    /// after every queue mutation.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SyncState) + Send + Sync + 'static,
    ) -> SubscriberId {
        self.listeners.subscribe(listener)
    }

    /// Removes a subscription. Returns true if it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Whether the engine currently believes the backend is reachable.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records a connectivity transition.
    ///
    /// Coming online always triggers an immediate drain attempt (no
    /// backoff) when auto-drain is enabled.
    pub fn set_online(self: &Arc<Self>, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        self.publish_state();

        if online && !was_online && self.config.auto_drain {
            self.spawn_drain(Duration::ZERO);
        }
    }

    /// The current externally visible state.
    pub fn state(&self) -> SyncState {
        let stats = {
            let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.stats().unwrap_or_default()
        };
        SyncState {
            is_online: self.online.load(Ordering::SeqCst),
            is_syncing: self.syncing.load(Ordering::SeqCst),
            pending_count: stats.pending + stats.syncing,
            failed_count: stats.failed,
            last_sync_at: *self.last_sync_at.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    fn publish_state(&self) {
        let state = self.state();
        self.listeners.notify(&state);
    }

    /// Enqueues an entity mutation for the remote backend.
    ///
    /// The entry is persisted before this method returns; an immediate
    /// crash still retains the mutation intent. If the engine is online and
    /// idle, an opportunistic drain is spawned — its failures are logged,
    /// never propagated to this call site.
    pub fn enqueue_mutation(
        self: &Arc<Self>,
        entity_type: impl Into<String>,
        operation: Operation,
        local_id: impl Into<String>,
        payload: Value,
    ) -> SyncResult<String> {
        let entry = QueueEntry::new(
            generate_id("q"),
            entity_type,
            operation,
            local_id,
            payload,
            self.clock.now(),
            self.config.max_retries,
        );

        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.append(&entry)?;
        }
        self.publish_state();

        if self.config.auto_drain && self.is_online() && !self.syncing.load(Ordering::SeqCst) {
            let delay = *self.drain_delay.lock().unwrap_or_else(|e| e.into_inner());
            self.spawn_drain(delay);
        }

        Ok(entry.id)
    }

    /// Spawns a drain as a detached task after the given delay.
    fn spawn_drain(self: &Arc<Self>, delay: Duration) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match engine.sync().await {
                Ok(report) => {
                    tracing::debug!(
                        success = report.success,
                        failed = report.failed,
                        "opportunistic drain finished"
                    );
                }
                Err(e) => {
                    tracing::warn!("opportunistic drain failed: {e}");
                }
            }
        });
    }

    /// Drains pending entries against the remote backend.
    ///
    /// Returns `{0, 0}` without doing work when sync is disabled, the
    /// engine is offline, or another drain is already in flight. The
    /// in-flight check and set happen synchronously, before any await.
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        if !self.config.enabled || !self.is_online() {
            return Ok(SyncReport::default());
        }
        if self.syncing.swap(true, Ordering::SeqCst) {
            return Ok(SyncReport::default());
        }
        let guard = DrainGuard(self);
        self.publish_state();

        let result = self.drain().await;

        match &result {
            Ok(report) => {
                {
                    let mut last = self.last_sync_at.lock().unwrap_or_else(|e| e.into_inner());
                    *last = Some(self.clock.now());
                }
                self.adjust_backoff(report.failed > 0);
                tracing::info!(
                    success = report.success,
                    failed = report.failed,
                    "drain finished"
                );
            }
            Err(e) => {
                self.adjust_backoff(true);
                tracing::warn!("drain aborted: {e}");
                // release any entries still claimed by this drain
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                if let Err(reset_err) = queue.reset_in_flight() {
                    tracing::warn!("failed to release claimed entries: {reset_err}");
                }
            }
        }

        drop(guard);
        self.publish_state();
        result
    }

    /// Doubles or resets the opportunistic drain delay.
    fn adjust_backoff(&self, had_failures: bool) {
        let mut delay = self.drain_delay.lock().unwrap_or_else(|e| e.into_inner());
        *delay = if had_failures {
            if delay.is_zero() {
                self.config.backoff_base
            } else {
                (*delay * 2).min(self.config.backoff_max)
            }
        } else {
            Duration::ZERO
        };
    }

    async fn drain(&self) -> SyncResult<SyncReport> {
        let pending = {
            let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.load_pending()?
        };

        let mut report = SyncReport::default();

        for batch in pending.chunks(self.config.batch_size.max(1)) {
            // claim the batch before touching the network
            let mut claimed: Vec<QueueEntry> = batch.to_vec();
            for entry in &mut claimed {
                entry.status = EntryStatus::Syncing;
            }
            {
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                queue.apply_updates(&claimed)?;
            }
            self.publish_state();

            let outcomes = join_all(claimed.iter().map(|e| self.apply_entry(e))).await;

            let mut updated = Vec::with_capacity(claimed.len());
            for (mut entry, outcome) in claimed.into_iter().zip(outcomes) {
                match outcome {
                    EntryOutcome::Completed => {
                        entry.complete();
                        report.success += 1;
                    }
                    EntryOutcome::Failed(message) => {
                        entry.record_failure(message.as_str());
                        report.failed += 1;
                        if entry.status == EntryStatus::Failed {
                            tracing::warn!(
                                entry = entry.id.as_str(),
                                "entry parked after {} attempts: {message}",
                                entry.retry_count
                            );
                        }
                    }
                    EntryOutcome::Parked(message) => {
                        entry.status = EntryStatus::Failed;
                        entry.error = Some(message.clone());
                        report.failed += 1;
                        tracing::warn!(entry = entry.id.as_str(), "entry parked: {message}");
                    }
                    EntryOutcome::Conflict(detail) => {
                        entry.flag_conflict(detail);
                        tracing::debug!(
                            entry = entry.id.as_str(),
                            "entry flagged for manual conflict resolution"
                        );
                    }
                }
                updated.push(entry);
            }

            {
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                queue.apply_updates(&updated)?;
            }
            self.publish_state();
        }

        Ok(report)
    }

    async fn apply_entry(&self, entry: &QueueEntry) -> EntryOutcome {
        let Some(applier) = self.appliers.get(&entry.entity_type) else {
            return EntryOutcome::Parked(format!(
                "no applier registered for entity type '{}'",
                entry.entity_type
            ));
        };

        match applier.apply(entry).await {
            Ok(ApplyOutcome::Acknowledged) => EntryOutcome::Completed,
            Ok(ApplyOutcome::Conflict { remote_updated_at }) => {
                self.arbitrate(applier.as_ref(), entry, remote_updated_at)
                    .await
            }
            Err(e) => EntryOutcome::Failed(e.to_string()),
        }
    }

    /// Applies the configured conflict policy to one conflicting entry.
    async fn arbitrate(
        &self,
        applier: &dyn RemoteApply,
        entry: &QueueEntry,
        remote_updated_at: DateTime<Utc>,
    ) -> EntryOutcome {
        let local_wins = match self.config.conflict {
            ConflictStrategy::LastWriteWins => entry.timestamp >= remote_updated_at,
            ConflictStrategy::LocalWins => true,
            ConflictStrategy::RemoteWins => false,
            ConflictStrategy::Manual => {
                return EntryOutcome::Conflict(format!(
                    "remote version updated at {}",
                    remote_updated_at.to_rfc3339()
                ));
            }
        };

        if local_wins {
            match applier.overwrite(entry).await {
                Ok(()) => EntryOutcome::Completed,
                Err(e) => EntryOutcome::Failed(e.to_string()),
            }
        } else {
            // remote version stands; the local mutation is superseded
            EntryOutcome::Completed
        }
    }

    /// Resolves a manually flagged conflict.
    pub async fn resolve_conflict(
        &self,
        entry_id: &str,
        choice: ResolveChoice,
    ) -> SyncResult<()> {
        let entry = {
            let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.get(entry_id)?
        }
        .ok_or_else(|| SyncError::EntryNotFound(entry_id.to_string()))?;

        if entry.status != EntryStatus::Conflict {
            return Err(SyncError::NotConflicted(entry_id.to_string()));
        }

        if choice == ResolveChoice::KeepLocal {
            let applier = self
                .appliers
                .get(&entry.entity_type)
                .ok_or_else(|| SyncError::NoApplier(entry.entity_type.clone()))?;
            applier.overwrite(&entry).await?;
        }

        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.remove(entry_id)?;
        }
        self.publish_state();
        Ok(())
    }

    /// All persisted entries, in insertion order.
    pub fn entries(&self) -> SyncResult<Vec<QueueEntry>> {
        let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        Ok(queue.load_all()?)
    }

    /// Entries parked `failed`.
    pub fn failed_entries(&self) -> SyncResult<Vec<QueueEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.status == EntryStatus::Failed)
            .collect())
    }

    /// Entries flagged `conflict`.
    pub fn conflicts(&self) -> SyncResult<Vec<QueueEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.status == EntryStatus::Conflict)
            .collect())
    }

    /// Removes one parked or conflicted entry.
    pub fn clear_entry(&self, entry_id: &str) -> SyncResult<bool> {
        let removed = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.remove(entry_id)?
        };
        self.publish_state();
        Ok(removed)
    }

    /// Removes all `failed` entries. Returns how many were cleared.
    pub fn clear_failed(&self) -> SyncResult<usize> {
        let cleared = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.clear_failed()?
        };
        self.publish_state();
        Ok(cleared)
    }
}
