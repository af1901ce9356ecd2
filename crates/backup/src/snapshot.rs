// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot model and on-disk snapshot store.
//!
//! A snapshot is one JSON document holding every record of every known
//! store, written whole and read whole. Files are named by their export
//! timestamp (`backup-{millis}.json`) so listing the directory yields the
//! snapshot history without opening any file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use reel_core::Record;

use crate::service::BackupError;

/// Version stamped into every snapshot document.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A full export of the record store at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    /// When the export ran.
    pub timestamp: DateTime<Utc>,
    /// Snapshot document version.
    pub version: u32,
    /// Store name → records, for every store known at export time.
    pub stores: BTreeMap<String, Vec<Record>>,
}

impl BackupSnapshot {
    /// Total records across all stores.
    pub fn record_count(&self) -> usize {
        self.stores.values().map(Vec::len).sum()
    }
}

/// Directory of timestamped snapshot files.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Create or open a snapshot directory.
    pub fn open(dir: &Path) -> Result<Self, BackupError> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        Ok(SnapshotStore {
            dir: dir.to_path_buf(),
        })
    }

    fn file_path(&self, timestamp: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("backup-{}.json", timestamp.timestamp_millis()))
    }

    /// Writes a snapshot atomically (temp file + rename).
    pub fn write(&self, snapshot: &BackupSnapshot) -> Result<PathBuf, BackupError> {
        let path = self.file_path(snapshot.timestamp);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string(snapshot)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        Ok(path)
    }

    /// Export timestamps of all stored snapshots, oldest first.
    pub fn list(&self) -> Result<Vec<DateTime<Utc>>, BackupError> {
        let mut stamps = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(millis) = name
                .strip_prefix("backup-")
                .and_then(|s| s.strip_suffix(".json"))
            else {
                continue;
            };
            let Ok(millis) = millis.parse::<i64>() else {
                continue;
            };
            if let Some(ts) = Utc.timestamp_millis_opt(millis).single() {
                stamps.push(ts);
            }
        }

        stamps.sort();
        Ok(stamps)
    }

    /// Reads the snapshot exported at the given timestamp.
    pub fn read(&self, timestamp: DateTime<Utc>) -> Result<BackupSnapshot, BackupError> {
        let json = fs::read_to_string(self.file_path(timestamp))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Reads the most recent snapshot, if any.
    pub fn latest(&self) -> Result<Option<BackupSnapshot>, BackupError> {
        match self.list()?.last() {
            Some(ts) => Ok(Some(self.read(*ts)?)),
            None => Ok(None),
        }
    }

    /// Timestamp of the most recent snapshot without reading it.
    pub fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, BackupError> {
        Ok(self.list()?.last().copied())
    }

    /// Removes the oldest snapshots, keeping the newest `keep`.
    ///
    /// Returns how many files were removed.
    pub fn prune(&self, keep: usize) -> Result<usize, BackupError> {
        let stamps = self.list()?;
        if stamps.len() <= keep {
            return Ok(0);
        }

        let excess = stamps.len() - keep;
        for ts in &stamps[..excess] {
            fs::remove_file(self.file_path(*ts))?;
        }
        Ok(excess)
    }

    /// Path of the snapshot directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
