// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Town feed curation.
//!
//! An append-only JSONL file of daemon-observed events (restarts, crash
//! loops, mass deaths, DB unhealth) that agents and humans can tail. The
//! curator trims it to a bounded tail so it never grows without limit.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Lines kept by a trim pass.
pub const FEED_KEEP_LINES: usize = 2000;

/// One feed line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEvent {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub detail: String,
}

/// Append-only feed writer with bounded-tail trimming.
pub struct FeedCurator {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FeedCurator {
    pub fn new(path: PathBuf) -> Self {
        Self { path, guard: Mutex::new(()) }
    }

    /// Append one event. Best-effort: feed problems never fail a tick.
    pub fn append(&self, at: DateTime<Utc>, kind: &str, detail: &str) {
        let event = FeedEvent { at, kind: kind.to_string(), detail: detail.to_string() };
        let Ok(line) = serde_json::to_string(&event) else { return };

        let _guard = self.guard.lock();
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = result {
            warn!(error = %e, "failed to append feed event");
        }
    }

    /// Trim to the last [`FEED_KEEP_LINES`] lines.
    pub fn trim(&self) {
        let _guard = self.guard.lock();
        let Ok(content) = std::fs::read_to_string(&self.path) else { return };
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() <= FEED_KEEP_LINES {
            return;
        }
        let tail = &lines[lines.len() - FEED_KEEP_LINES..];
        if let Err(e) = std::fs::write(&self.path, format!("{}\n", tail.join("\n"))) {
            warn!(error = %e, "failed to trim feed");
        }
    }

    /// Parsed events currently in the feed (newest last).
    pub fn events(&self) -> Vec<FeedEvent> {
        let Ok(content) = std::fs::read_to_string(&self.path) else { return Vec::new() };
        content.lines().filter_map(|line| serde_json::from_str(line).ok()).collect()
    }
}
