// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier generation.
//!
//! Ids take the form `{prefix}-{hash8}` where the hash is the first eight
//! hex characters of a SHA-256 over the prefix, the current time, and a
//! process-local counter. The counter guarantees uniqueness even when two
//! ids are generated within the same nanosecond.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a new identifier with the given prefix.
pub fn generate_id(prefix: &str) -> String {
    let seq = COUNTER.fetch_add(1, Ordering::SeqCst);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(seq.to_le_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{prefix}-{}", &digest[..8])
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
