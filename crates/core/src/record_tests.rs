// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use chrono::TimeZone;
use serde_json::json;

#[test]
fn new_record_stamps_both_timestamps() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let record = Record::new("gen-a1b2c3d4", json!({"prompt": "dunes at dawn"}), now);

    assert_eq!(record.created_at, now);
    assert_eq!(record.updated_at, now);
}

#[test]
fn touch_moves_only_updated_at() {
    let created = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2026, 3, 1, 10, 30, 0).unwrap();

    let mut record = Record::new("gen-a1b2c3d4", json!({}), created);
    record.touch(later);

    assert_eq!(record.created_at, created);
    assert_eq!(record.updated_at, later);
}

#[test]
fn record_serde_round_trip() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let record = Record::new("proj-00ff00aa", json!({"title": "spring reel"}), now);

    let json = serde_json::to_string(&record).unwrap();
    let back: Record = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
}
