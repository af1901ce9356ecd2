// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The backup service.
//!
//! Exports every known store on a fixed interval (default 24h) and
//! opportunistically via [`BackupService::export_if_due`] — the hook a host
//! calls before unload. Exports open their own read connection on the
//! database path, so the primary write path is never blocked (the store
//! runs in WAL mode). Restore replays each snapshot record through
//! `Database::put`, skipping stores absent from the current schema.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reel_core::{is_known_store, ClockSource, Database, SystemClock, KNOWN_STORES};

use crate::snapshot::{BackupSnapshot, SnapshotStore, SNAPSHOT_VERSION};

/// Error type for backup operations.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Record store failure.
    #[error("store error: {0}")]
    Store(#[from] reel_core::Error),

    /// Snapshot file I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Restore was requested but no snapshot exists.
    #[error("no snapshot available")]
    NoSnapshot,
}

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Configuration for the backup service.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Time between exports.
    pub interval: Duration,
    /// Snapshots retained; older ones are pruned after each export.
    pub keep: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            interval: Duration::from_secs(24 * 60 * 60),
            keep: 7,
        }
    }
}

/// Periodic exporter and disaster-recovery restorer for the record store.
pub struct BackupService {
    db_path: PathBuf,
    snapshots: SnapshotStore,
    config: BackupConfig,
    clock: Arc<dyn ClockSource>,
}

impl BackupService {
    /// Creates a service exporting the database at `db_path` into
    /// `snapshot_dir`.
    pub fn new(
        db_path: &Path,
        snapshot_dir: &Path,
        config: BackupConfig,
    ) -> BackupResult<Self> {
        Ok(BackupService {
            db_path: db_path.to_path_buf(),
            snapshots: SnapshotStore::open(snapshot_dir)?,
            config,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the clock (for testing).
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Exports all known stores now, then prunes old snapshots.
    pub fn export_now(&self) -> BackupResult<BackupSnapshot> {
        let db = Database::open(&self.db_path)?;

        let mut stores = BTreeMap::new();
        for store in KNOWN_STORES {
            stores.insert(store.to_string(), db.get_all(store)?);
        }

        let snapshot = BackupSnapshot {
            timestamp: self.clock.now(),
            version: SNAPSHOT_VERSION,
            stores,
        };
        self.snapshots.write(&snapshot)?;
        let pruned = self.snapshots.prune(self.config.keep)?;

        tracing::info!(
            records = snapshot.record_count(),
            pruned,
            "exported backup snapshot"
        );
        Ok(snapshot)
    }

    /// Returns true if the export interval has elapsed since the latest
    /// snapshot (or no snapshot exists yet).
    pub fn due(&self) -> BackupResult<bool> {
        let Some(latest) = self.snapshots.latest_timestamp()? else {
            return Ok(true);
        };
        let Ok(interval) = chrono::Duration::from_std(self.config.interval) else {
            return Ok(false);
        };
        Ok(self.clock.now() - latest >= interval)
    }

    /// Exports only if the interval has elapsed.
    ///
    /// Hosts call this before unload.
    pub fn export_if_due(&self) -> BackupResult<Option<BackupSnapshot>> {
        if self.due()? {
            Ok(Some(self.export_now()?))
        } else {
            Ok(None)
        }
    }

    /// Periodic export loop.
    ///
    /// Spawn this as a detached task. Export failures are logged and the
    /// loop continues; nothing propagates to the spawner.
    pub async fn run(&self) {
        loop {
            match self.export_if_due() {
                Ok(Some(snapshot)) => {
                    tracing::debug!(records = snapshot.record_count(), "periodic export done");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("periodic export failed: {e}");
                }
            }
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// Replays a snapshot into a database.
    ///
    /// Stores absent from the current schema are skipped with a warning.
    /// Returns the number of records restored.
    pub fn restore(snapshot: &BackupSnapshot, db: &Database) -> BackupResult<usize> {
        let mut restored = 0;

        for (store, records) in &snapshot.stores {
            if !is_known_store(store) {
                tracing::warn!(store = store.as_str(), "skipping unknown store on restore");
                continue;
            }
            for record in records {
                db.put(store, record)?;
                restored += 1;
            }
        }

        Ok(restored)
    }

    /// Restores the most recent snapshot into the configured database.
    pub fn restore_latest(&self) -> BackupResult<usize> {
        let snapshot = self.snapshots.latest()?.ok_or(BackupError::NoSnapshot)?;
        let db = Database::open(&self.db_path)?;
        Self::restore(&snapshot, &db)
    }

    /// The underlying snapshot store.
    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }
}
