// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: lock-first singleton acquisition and pre-flight.

use super::{LifecycleError, TownPaths};
use fs2::FileExt;
use gt_core::{PatrolConfig, RigsConfig};
use serde::Deserialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Issue-store backend every rig must be on.
const EXPECTED_BACKEND: &str = "dolt";

/// Held for the entire run; dropping releases the singleton lock.
#[derive(Debug)]
pub struct DaemonHandle {
    pub paths: TownPaths,
    // NOTE(lifetime): held to maintain the exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl DaemonHandle {
    /// Best-effort cleanup on graceful exit. The lock itself releases when
    /// the handle drops.
    pub fn shutdown(&self) {
        if let Err(e) = std::fs::remove_file(self.paths.pid_path()) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, "failed to remove PID file");
            }
        }
        info!("daemon shutdown complete");
    }
}

/// Everything startup produces.
#[derive(Debug)]
pub struct StartupResult {
    pub handle: DaemonHandle,
    pub config: PatrolConfig,
    pub rigs: RigsConfig,
}

/// Acquire the singleton, write the PID file, load configuration from the
/// town, and run pre-flight checks. Startup blockers fail hard; nothing
/// here retries.
pub fn startup(paths: &TownPaths) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(paths.daemon_dir())?;
    std::fs::create_dir_all(paths.escalations_dir())?;

    // Acquire the lock FIRST. Open without truncating: wiping the file
    // before holding the lock would clobber the running daemon's lock file.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(paths.lock_path())?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    // PID file is written only after the lock is held.
    let mut pid_file = File::create(paths.pid_path())?;
    writeln!(pid_file, "{}", std::process::id())?;

    let config = load_json_config(&paths.patrol_config_path(), PatrolConfig::from_json)?;
    let rigs = load_json_config(&paths.rigs_config_path(), RigsConfig::from_json)?;

    preflight(paths, &rigs)?;

    info!(town = %paths.root.display(), rigs = rigs.names().count(), "daemon startup complete");

    Ok(StartupResult { handle: DaemonHandle { paths: paths.clone(), lock_file }, config, rigs })
}

fn load_json_config<T: Default>(
    path: &Path,
    parse: impl FnOnce(&str) -> Result<T, serde_json::Error>,
) -> Result<T, LifecycleError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            parse(&content).map_err(|source| LifecycleError::Config { path: path.into(), source })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize)]
struct BeadsMetadata {
    #[serde(default)]
    backend: String,
}

/// Every rig's issue store must be on the expected backend before the
/// daemon starts driving it.
fn preflight(paths: &TownPaths, rigs: &RigsConfig) -> Result<(), LifecycleError> {
    let mut failures = Vec::new();
    for rig in rigs.names() {
        let metadata_path = rigs.rig_path(&paths.root, rig).join(".beads").join("metadata.json");
        let backend = std::fs::read_to_string(&metadata_path)
            .ok()
            .and_then(|content| serde_json::from_str::<BeadsMetadata>(&content).ok())
            .map(|m| m.backend);
        match backend.as_deref() {
            Some(EXPECTED_BACKEND) => {}
            Some(other) => failures.push(format!(
                "rig {rig}: issue store backend is '{other}', expected '{EXPECTED_BACKEND}' \
                 (run `bd migrate --to={EXPECTED_BACKEND}` in {})",
                metadata_path.display()
            )),
            None => failures.push(format!(
                "rig {rig}: missing or unreadable {} \
                 (run `bd init --backend={EXPECTED_BACKEND}` in the rig root)",
                metadata_path.display()
            )),
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(LifecycleError::Preflight(failures))
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
