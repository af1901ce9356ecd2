// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn all_paths_share_the_data_dir() {
    let root = data_dir();
    assert!(database_path().starts_with(&root));
    assert!(queue_path().starts_with(&root));
    assert!(tasks_path().starts_with(&root));
    assert!(backups_dir().starts_with(&root));
}

#[test]
fn store_files_are_distinct() {
    assert_ne!(database_path(), queue_path());
    assert_ne!(queue_path(), tasks_path());
}
