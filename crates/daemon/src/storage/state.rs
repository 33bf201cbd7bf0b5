// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon state file (`daemon/state.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted daemon state. Created on Run, updated on every heartbeat,
/// marked `running=false` on graceful shutdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonState {
    pub running: bool,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default)]
    pub heartbeat_count: u64,
}

/// Reader/writer for the state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the state; absence reads as empty state.
    pub fn load(&self) -> std::io::Result<DaemonState> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DaemonState::default()),
            Err(e) => Err(e),
        }
    }

    /// Atomic write (temp + rename).
    pub fn save(&self, state: &DaemonState) -> std::io::Result<()> {
        super::write_json_atomic(&self.path, state)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
