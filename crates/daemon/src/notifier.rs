// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time-bounded suppression of repeated escalations.
//!
//! A persistent table of `(key, slot) → last_sent` under
//! `daemon/escalations/`, one record per file. `ready` atomically checks
//! the window and records the send, so concurrent callers agree on who
//! got to send.

use chrono::{DateTime, Utc};
use gt_core::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Escalations sharing a `(kind, key)` go out at most once per window.
pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct DedupRecord {
    last_sent: DateTime<Utc>,
}

/// Persistent `(key, slot)` dedup table.
pub struct DedupTable<C: Clock> {
    dir: PathBuf,
    window: Duration,
    clock: C,
    // Serializes check-and-record so concurrent callers cannot both pass
    guard: Mutex<()>,
}

impl<C: Clock> DedupTable<C> {
    pub fn new(dir: PathBuf, clock: C) -> Self {
        Self { dir, window: SUPPRESSION_WINDOW, clock, guard: Mutex::new(()) }
    }

    /// If the `(key, slot)` pair is outside its suppression window, record
    /// `now` and return true. Otherwise return false.
    pub fn ready(&self, key: &str, slot: &str) -> std::io::Result<bool> {
        let _guard = self.guard.lock();
        let now = self.clock.utc_now();
        let path = self.record_path(key, slot);

        if let Some(last_sent) = read_last_sent(&path) {
            let age = (now - last_sent).to_std().unwrap_or(Duration::ZERO);
            if age < self.window {
                return Ok(false);
            }
        }

        std::fs::create_dir_all(&self.dir)?;
        let record = DedupRecord { last_sent: now };
        let json = serde_json::to_vec(&record)?;
        std::fs::write(&path, json)?;
        Ok(true)
    }

    /// When the pair last sent, if ever.
    pub fn last_sent(&self, key: &str, slot: &str) -> Option<DateTime<Utc>> {
        read_last_sent(&self.record_path(key, slot))
    }

    fn record_path(&self, key: &str, slot: &str) -> PathBuf {
        self.dir.join(format!("{}__{}.json", sanitize(slot), sanitize(key)))
    }
}

fn read_last_sent(path: &Path) -> Option<DateTime<Utc>> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str::<DedupRecord>(&content).ok().map(|r| r.last_sent)
}

/// Keys contain identity separators; keep filenames flat.
fn sanitize(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

#[cfg(test)]
#[path = "notifier_tests.rs"]
mod tests;
