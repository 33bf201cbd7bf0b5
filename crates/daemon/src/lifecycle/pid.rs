// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PID file probing and orphan cleanup.
//!
//! Reading a PID file is never enough: the process may have died and the
//! pid been reused. Every probe verifies the command line identifies the
//! process as this daemon before concluding anything.

use super::{LifecycleError, TownPaths};
use gt_adapters::proc;
use std::time::Duration;
use tracing::{info, warn};

/// Command-line fragment identifying a running town daemon.
pub const DAEMON_SIGNATURE: &str = "gtd";

/// PID of the daemon owning this town, if one is alive.
///
/// A stale PID file (dead process, or a reused pid whose command line is
/// not this daemon) is removed and reported as [`LifecycleError::StalePid`].
pub async fn running_pid(paths: &TownPaths) -> Result<Option<i32>, LifecycleError> {
    let pid_path = paths.pid_path();
    let content = match std::fs::read_to_string(&pid_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let pid: i32 = match content.trim().parse() {
        Ok(pid) => pid,
        Err(_) => {
            let _ = std::fs::remove_file(&pid_path);
            return Err(LifecycleError::InvalidPid { path: pid_path, content });
        }
    };

    if !proc::pid_alive(pid) {
        let _ = std::fs::remove_file(&pid_path);
        return Err(LifecycleError::StalePid { pid });
    }

    // Defeat PID reuse: the live process must actually be this daemon.
    match proc::process_command(pid).await {
        Some(command) if command.contains(DAEMON_SIGNATURE) => Ok(Some(pid)),
        _ => {
            warn!(pid, "PID file points at a foreign process, removing");
            let _ = std::fs::remove_file(&pid_path);
            Err(LifecycleError::StalePid { pid })
        }
    }
}

/// Whether a daemon is running for this town. Stale files count as "no".
pub async fn is_running(paths: &TownPaths) -> bool {
    matches!(running_pid(paths).await, Ok(Some(_)))
}

/// Daemon processes other than ourselves, by command-line signature.
pub async fn find_orphaned() -> Vec<proc::ProcessEntry> {
    let own_pid = std::process::id() as i32;
    match proc::list_processes().await {
        Ok(table) => table
            .into_iter()
            .filter(|e| e.pid != own_pid && is_daemon_command(&e.command))
            .collect(),
        Err(e) => {
            warn!(error = %e, "failed to enumerate processes");
            Vec::new()
        }
    }
}

/// Terminate, grace, then kill every orphaned daemon. Returns the count.
pub async fn kill_orphaned() -> usize {
    let orphans = find_orphaned().await;
    for orphan in &orphans {
        info!(pid = orphan.pid, command = %orphan.command, "killing orphaned daemon");
        proc::terminate_tree(orphan.pid, Duration::from_secs(2)).await;
    }
    orphans.len()
}

/// The daemon signature must appear as the binary, not as a substring of
/// an argument (`vim gtd.log` is not a daemon).
fn is_daemon_command(command: &str) -> bool {
    command
        .split_whitespace()
        .next()
        .map(|bin| bin.rsplit('/').next().unwrap_or(bin) == DAEMON_SIGNATURE)
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "pid_tests.rs"]
mod tests;
