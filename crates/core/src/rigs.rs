// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rig registry (`mayor/rigs.json`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default session/bead prefix when a rig does not set one.
pub const DEFAULT_PREFIX: &str = "gt";

/// The town's rig registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigsConfig {
    #[serde(default)]
    pub rigs: BTreeMap<String, RigEntry>,
}

impl RigsConfig {
    /// Parse from JSON, treating an empty document as no rigs.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }

    /// Rig names in stable order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rigs.keys().map(String::as_str)
    }

    pub fn get(&self, rig: &str) -> Option<&RigEntry> {
        self.rigs.get(rig)
    }

    /// Session/bead prefix for a rig (default `gt`).
    pub fn prefix(&self, rig: &str) -> &str {
        self.rigs
            .get(rig)
            .and_then(|e| e.prefix.as_deref())
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PREFIX)
    }

    /// Filesystem root of a rig (default `<town>/<rig>`).
    pub fn rig_path(&self, town: &Path, rig: &str) -> PathBuf {
        match self.rigs.get(rig).and_then(|e| e.path.clone()) {
            Some(path) if path.is_absolute() => path,
            Some(path) => town.join(path),
            None => town.join(rig),
        }
    }
}

/// One rig's registry entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigEntry {
    /// Short session/bead prefix, typically `gt` or a customer prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Rig root relative to the town (defaults to the rig name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// `parked` or `docked` takes the rig out of service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Explicitly blocking auto-restart also takes the rig out of service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_restart: Option<bool>,
}

impl RigEntry {
    /// Local (registry-side) reason this rig is not operational, if any.
    ///
    /// The full operational predicate also consults the rig bead's labels
    /// through the issue-tracker port; that half lives with the daemon.
    pub fn local_block(&self) -> Option<String> {
        match self.status.as_deref() {
            Some(status @ ("parked" | "docked")) => {
                return Some(format!("rig status is {status}"));
            }
            _ => {}
        }
        if self.auto_restart == Some(false) {
            return Some("auto_restart is disabled".to_string());
        }
        None
    }
}

#[cfg(test)]
#[path = "rigs_tests.rs"]
mod tests;
