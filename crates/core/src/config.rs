// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Patrol configuration (`mayor/daemon.json`).
//!
//! Every field tolerates absence; a missing or empty file yields the
//! defaults (all session patrols on, managed DB off). Durations are stored
//! as strings and parsed on access so a malformed value degrades to the
//! default instead of failing the whole config load.

use crate::duration::parse_duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default heartbeat cadence (recovery-focused variant).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(180);
/// Default managed-DB health probe cadence; finer than the heartbeat.
pub const DEFAULT_DB_HEALTH_INTERVAL: Duration = Duration::from_secs(30);
/// Default remotes push cadence.
pub const DEFAULT_REMOTES_INTERVAL: Duration = Duration::from_secs(15 * 60);

fn default_true() -> bool {
    true
}

/// Top-level patrol config, `mayor/daemon.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatrolConfig {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub patrols: Patrols,
}

impl PatrolConfig {
    /// Parse from JSON, treating an empty document as defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }
}

/// Heartbeat toggle and cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { enabled: true, interval: None }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        interval_or(self.interval.as_deref(), DEFAULT_HEARTBEAT_INTERVAL)
    }
}

/// Per-subsystem patrol toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Patrols {
    #[serde(default)]
    pub deacon: PatrolToggle,
    #[serde(default)]
    pub witness: RigPatrolToggle,
    #[serde(default)]
    pub refinery: RigPatrolToggle,
    #[serde(default)]
    pub dolt_server: DoltServerConfig,
    #[serde(default)]
    pub dolt_remotes: RemotesConfig,
}

/// On/off switch for a town-level patrol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatrolToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PatrolToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// On/off switch for a per-rig patrol, with an optional rig allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigPatrolToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// When present, only these rigs are patrolled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rigs: Option<Vec<String>>,
}

impl Default for RigPatrolToggle {
    fn default() -> Self {
        Self { enabled: true, rigs: None }
    }
}

impl RigPatrolToggle {
    /// Whether this patrol covers the given rig.
    pub fn covers(&self, rig: &str) -> bool {
        if !self.enabled {
            return false;
        }
        match &self.rigs {
            Some(rigs) => rigs.iter().any(|r| r == rig),
            None => true,
        }
    }
}

/// Managed dolt sql-server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoltServerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Externally managed: probe health only, never start or stop.
    #[serde(default)]
    pub external: bool,
    #[serde(default = "DoltServerConfig::default_host")]
    pub host: String,
    #[serde(default = "DoltServerConfig::default_port")]
    pub port: u16,
    /// Server data directory; relative paths resolve under the town root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Server log file; defaults to `daemon/dolt-server.log`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub auto_restart: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_delay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restart_delay: Option<String>,
    #[serde(default = "DoltServerConfig::default_max_restarts")]
    pub max_restarts_in_window: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy_reset_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_interval: Option<String>,
}

impl Default for DoltServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            external: false,
            host: Self::default_host(),
            port: Self::default_port(),
            data_dir: None,
            log_file: None,
            auto_restart: true,
            restart_delay: None,
            max_restart_delay: None,
            max_restarts_in_window: Self::default_max_restarts(),
            restart_window: None,
            healthy_reset_interval: None,
            health_check_interval: None,
        }
    }
}

impl DoltServerConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        3306
    }

    fn default_max_restarts() -> u32 {
        5
    }

    pub fn restart_delay(&self) -> Duration {
        interval_or(self.restart_delay.as_deref(), Duration::from_secs(5))
    }

    pub fn max_restart_delay(&self) -> Duration {
        interval_or(self.max_restart_delay.as_deref(), Duration::from_secs(5 * 60))
    }

    pub fn restart_window(&self) -> Duration {
        interval_or(self.restart_window.as_deref(), Duration::from_secs(10 * 60))
    }

    pub fn healthy_reset_interval(&self) -> Duration {
        interval_or(self.healthy_reset_interval.as_deref(), Duration::from_secs(10 * 60))
    }

    pub fn health_check_interval(&self) -> Duration {
        interval_or(self.health_check_interval.as_deref(), DEFAULT_DB_HEALTH_INTERVAL)
    }
}

/// Remotes push ticker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotesConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl Default for RemotesConfig {
    fn default() -> Self {
        Self { enabled: false, interval: None }
    }
}

impl RemotesConfig {
    pub fn interval(&self) -> Duration {
        interval_or(self.interval.as_deref(), DEFAULT_REMOTES_INTERVAL)
    }
}

fn interval_or(value: Option<&str>, default: Duration) -> Duration {
    value.and_then(|s| parse_duration(s).ok()).unwrap_or(default)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
