// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the backup service.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;
use tempfile::tempdir;

use reel_core::{Database, FixedClock, Record};

use super::service::{BackupConfig, BackupError, BackupService};
use super::snapshot::{BackupSnapshot, SNAPSHOT_VERSION};

fn seed_database(path: &std::path::Path) {
    let db = Database::open(path).unwrap();
    let now = Utc::now();
    db.put(
        "generations",
        &Record::new("gen-aaaa1111", json!({"prompt": "dunes"}), now),
    )
    .unwrap();
    db.put(
        "generations",
        &Record::new("gen-bbbb2222", json!({"prompt": "surf"}), now),
    )
    .unwrap();
    db.put(
        "projects",
        &Record::new("proj-cccc3333", json!({"title": "spring reel"}), now),
    )
    .unwrap();
}

#[test]
fn export_captures_every_known_store() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("library.db");
    seed_database(&db_path);

    let service =
        BackupService::new(&db_path, &dir.path().join("backups"), BackupConfig::default())
            .unwrap();

    let snapshot = service.export_now().unwrap();
    assert_eq!(snapshot.record_count(), 3);
    assert_eq!(snapshot.stores["generations"].len(), 2);
    assert_eq!(snapshot.stores["projects"].len(), 1);
    assert!(snapshot.stores.contains_key("models"));
}

#[test]
fn restore_replays_into_an_empty_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("library.db");
    seed_database(&db_path);

    let service =
        BackupService::new(&db_path, &dir.path().join("backups"), BackupConfig::default())
            .unwrap();
    service.export_now().unwrap();

    // disaster: the database is lost
    std::fs::remove_file(&db_path).unwrap();

    let restored = service.restore_latest().unwrap();
    assert_eq!(restored, 3);

    let db = Database::open(&db_path).unwrap();
    assert_eq!(db.count("generations").unwrap(), 2);
    assert_eq!(db.count("projects").unwrap(), 1);
    assert!(db.exists("generations", "gen-aaaa1111").unwrap());
}

#[test]
fn restore_skips_unknown_stores() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("library.db");
    let db = Database::open(&db_path).unwrap();

    let now = Utc::now();
    let mut stores = BTreeMap::new();
    stores.insert(
        "generations".to_string(),
        vec![Record::new("gen-aaaa1111", json!({}), now)],
    );
    // a store from a schema this build no longer has
    stores.insert(
        "thumbnails".to_string(),
        vec![Record::new("thumb-bbbb2222", json!({}), now)],
    );
    let snapshot = BackupSnapshot {
        timestamp: now,
        version: SNAPSHOT_VERSION,
        stores,
    };

    let restored = BackupService::restore(&snapshot, &db).unwrap();
    assert_eq!(restored, 1);
    assert_eq!(db.count("generations").unwrap(), 1);
}

#[test]
fn restore_without_snapshot_is_an_error() {
    let dir = tempdir().unwrap();
    let service = BackupService::new(
        &dir.path().join("library.db"),
        &dir.path().join("backups"),
        BackupConfig::default(),
    )
    .unwrap();

    let err = service.restore_latest().unwrap_err();
    assert!(matches!(err, BackupError::NoSnapshot));
}

#[test]
fn due_follows_the_interval() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("library.db");
    seed_database(&db_path);

    let start = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap();
    let clock = Arc::new(FixedClock::new(start));
    let service =
        BackupService::new(&db_path, &dir.path().join("backups"), BackupConfig::default())
            .unwrap()
            .with_clock(Arc::clone(&clock) as Arc<dyn reel_core::ClockSource>);

    // nothing exported yet
    assert!(service.due().unwrap());

    service.export_now().unwrap();
    assert!(!service.due().unwrap());

    clock.advance(ChronoDuration::hours(23));
    assert!(!service.due().unwrap());

    clock.advance(ChronoDuration::hours(1));
    assert!(service.due().unwrap());
}

#[test]
fn export_if_due_is_cheap_when_fresh() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("library.db");
    seed_database(&db_path);

    let start = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap();
    let clock = Arc::new(FixedClock::new(start));
    let service =
        BackupService::new(&db_path, &dir.path().join("backups"), BackupConfig::default())
            .unwrap()
            .with_clock(Arc::clone(&clock) as Arc<dyn reel_core::ClockSource>);

    assert!(service.export_if_due().unwrap().is_some());
    assert!(service.export_if_due().unwrap().is_none());

    clock.advance(ChronoDuration::hours(25));
    assert!(service.export_if_due().unwrap().is_some());
    assert_eq!(service.snapshots().list().unwrap().len(), 2);
}

#[test]
fn old_snapshots_are_pruned_after_export() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("library.db");
    seed_database(&db_path);

    let start = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap();
    let clock = Arc::new(FixedClock::new(start));
    let config = BackupConfig {
        interval: Duration::from_secs(24 * 60 * 60),
        keep: 2,
    };
    let service = BackupService::new(&db_path, &dir.path().join("backups"), config)
        .unwrap()
        .with_clock(Arc::clone(&clock) as Arc<dyn reel_core::ClockSource>);

    for _ in 0..4 {
        service.export_now().unwrap();
        clock.advance(ChronoDuration::days(1));
    }

    assert_eq!(service.snapshots().list().unwrap().len(), 2);
}
