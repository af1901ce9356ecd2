// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Default on-disk layout for the persistence core.
//!
//! All state lives under one data directory: the SQLite record store, the
//! queue and task JSONL files, and the backup snapshot directory. Callers
//! may place each file anywhere; these are the defaults a composition root
//! wires together.

use std::path::PathBuf;

/// Default data directory (`~/.local/share/reel` on Linux).
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reel")
}

/// Default path of the record store database.
pub fn database_path() -> PathBuf {
    data_dir().join("library.db")
}

/// Default path of the offline mutation queue.
pub fn queue_path() -> PathBuf {
    data_dir().join("queue.jsonl")
}

/// Default path of the task state log.
pub fn tasks_path() -> PathBuf {
    data_dir().join("tasks.jsonl")
}

/// Default directory for backup snapshots.
pub fn backups_dir() -> PathBuf {
    data_dir().join("backups")
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
