// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: town layout, singleton lock, startup, shutdown.

mod pid;
mod startup;

pub use pid::{find_orphaned, is_running, kill_orphaned, running_pid, DAEMON_SIGNATURE};
pub use startup::{startup, DaemonHandle, StartupResult};

use std::path::PathBuf;
use thiserror::Error;

/// Filesystem layout under one town root.
#[derive(Debug, Clone)]
pub struct TownPaths {
    pub root: PathBuf,
}

impl TownPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn daemon_dir(&self) -> PathBuf {
        self.root.join("daemon")
    }

    /// Advisory exclusive lock held for the entire run.
    pub fn lock_path(&self) -> PathBuf {
        self.daemon_dir().join("daemon.lock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.daemon_dir().join("daemon.pid")
    }

    /// Held by the orchestrator during graceful shutdown; heartbeats skip
    /// entirely while it is locked.
    pub fn shutdown_lock_path(&self) -> PathBuf {
        self.daemon_dir().join("shutdown.lock")
    }

    pub fn state_path(&self) -> PathBuf {
        self.daemon_dir().join("state.json")
    }

    pub fn restart_state_path(&self) -> PathBuf {
        self.daemon_dir().join("restart_state.json")
    }

    pub fn escalations_dir(&self) -> PathBuf {
        self.daemon_dir().join("escalations")
    }

    pub fn log_path(&self) -> PathBuf {
        self.daemon_dir().join("daemon.log")
    }

    pub fn feed_path(&self) -> PathBuf {
        self.daemon_dir().join("feed.jsonl")
    }

    pub fn dolt_pid_path(&self) -> PathBuf {
        self.daemon_dir().join("dolt-server.pid")
    }

    pub fn dolt_log_path(&self) -> PathBuf {
        self.daemon_dir().join("dolt-server.log")
    }

    /// Presence signals persistent DB unhealth to external tools.
    pub fn dolt_unhealthy_path(&self) -> PathBuf {
        self.daemon_dir().join("DOLT_UNHEALTHY")
    }

    pub fn mayor_dir(&self) -> PathBuf {
        self.root.join("mayor")
    }

    pub fn rigs_config_path(&self) -> PathBuf {
        self.mayor_dir().join("rigs.json")
    }

    pub fn patrol_config_path(&self) -> PathBuf {
        self.mayor_dir().join("daemon.json")
    }

    pub fn deacon_dir(&self) -> PathBuf {
        self.root.join("deacon")
    }

    pub fn dogs_dir(&self) -> PathBuf {
        self.deacon_dir().join("dogs")
    }
}

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine town root (set GT_TOWN_ROOT or HOME)")]
    NoTownRoot,

    #[error("failed to acquire daemon lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("invalid PID file at {path}: {content:?}")]
    InvalidPid { path: PathBuf, content: String },

    #[error("removed stale PID file for dead or foreign pid {pid}")]
    StalePid { pid: i32 },

    #[error("pre-flight failed:\n{}", .0.join("\n"))]
    Preflight(Vec<String>),

    #[error("bad config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
