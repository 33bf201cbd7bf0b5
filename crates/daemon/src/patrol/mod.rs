// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mechanical patrol.
//!
//! Eleven discrete housekeeping steps run on every heartbeat, each
//! best-effort. The ordering is contractual: orphans are reaped before any
//! new spawn, gates are evaluated before fresh dispatch, and dispatch
//! precedes the idle declaration.

mod dogs;
mod logrotate;
mod orphans;

pub use logrotate::rotate_log_if_needed;

use crate::daemon::Daemon;
use gt_adapters::tracker::{GateOutcome, GateType};
use gt_adapters::{IssueTrackerPort, MailPort, MultiplexerPort};
use gt_core::{Clock, ParsedIdentity, RoleType};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Daemon log size that triggers rotation.
const MAX_LOG_SIZE: u64 = 100 * 1024 * 1024;
/// Read mechanical mail older than this gets archived.
const MAIL_ARCHIVE_AGE: Duration = Duration::from_secs(24 * 3600);

/// What a patrol pass observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatrolReport {
    pub town_idle: bool,
}

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    /// Run the eleven steps in order.
    pub async fn run_patrol(&self) -> PatrolReport {
        self.reap_orphan_processes().await; // 1
        self.check_gates(GateType::Timer).await; // 2
        self.check_gates(GateType::Bead).await; // 3
        self.top_up_dog_pool().await; // 4
        self.check_dog_health().await; // 5
        self.compact_wisps().await; // 6
        self.session_gc().await; // 7
        self.rotate_daemon_log(); // 8
        self.feed_stranded_convoys().await; // 9
        let town_idle = self.is_town_idle().await; // 10
        if town_idle {
            info!("town idle, skipping health pings");
        }
        self.archive_coordinator_mail().await; // 11
        PatrolReport { town_idle }
    }

    /// Town root plus every rig root.
    fn patrol_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.paths.root.clone()];
        for rig in self.rig_names() {
            dirs.push(self.rig_path(&rig));
        }
        dirs
    }

    /// Steps 2 and 3: evaluate one gate type everywhere.
    async fn check_gates(&self, gate: GateType) {
        for dir in self.patrol_dirs() {
            match self.tracker.gate_check(&dir, gate).await {
                Ok(GateOutcome::Triggered(output)) => {
                    let output = output.trim();
                    if !output.is_empty() {
                        info!(dir = %dir.display(), gate = gate.as_str(), %output, "gate fired");
                    }
                }
                Ok(GateOutcome::NothingToDo) => {}
                Err(e) => {
                    warn!(dir = %dir.display(), gate = gate.as_str(), error = %e, "gate check failed");
                }
            }
        }
    }

    /// Step 6: wisp TTL compaction everywhere.
    async fn compact_wisps(&self) {
        for dir in self.patrol_dirs() {
            match self.tracker.compact(&dir).await {
                Ok(stats) if !stats.is_trivial() => {
                    info!(
                        dir = %dir.display(),
                        deleted = stats.deleted,
                        promoted = stats.promoted,
                        skipped = stats.skipped,
                        "wisp compaction"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(dir = %dir.display(), error = %e, "compaction failed"),
            }
        }
    }

    /// Step 7: report missing witness/refinery sessions. The heartbeat's
    /// ensure pass restarts them; this step only makes the gap visible.
    async fn session_gc(&self) {
        for rig in self.rig_names() {
            for role in [RoleType::Witness, RoleType::Refinery] {
                let Ok(id) = ParsedIdentity::rig_singleton(role, &rig) else { continue };
                let session = self.session_name_for(&id);
                match self.mux.has_session(&session).await {
                    Ok(false) => info!(rig = %rig, %session, "expected session missing"),
                    Ok(true) => {}
                    Err(e) => warn!(rig = %rig, %session, error = %e, "session probe failed"),
                }
            }
        }
    }

    /// Step 8: rotate the daemon log when it outgrows the cap.
    fn rotate_daemon_log(&self) {
        logrotate::rotate_if_larger(&self.paths.log_path(), MAX_LOG_SIZE);
    }

    /// Step 9: fallback convoy feeding. When stranded work groups have
    /// ready items and idle worker capacity exists, dispatch up to that
    /// capacity.
    async fn feed_stranded_convoys(&self) {
        let capacity = self.count_idle_dogs();
        if capacity == 0 {
            return;
        }
        let convoys = match self.tracker.stranded_convoys(&self.paths.root).await {
            Ok(convoys) => convoys,
            Err(e) => {
                warn!(error = %e, "stranded convoy listing failed");
                return;
            }
        };
        let mut dispatched = 0usize;
        for convoy in convoys {
            if dispatched >= capacity {
                break;
            }
            if convoy.ready_count == 0 {
                continue;
            }
            match self.tracker.dispatch_convoy(&self.paths.root, &convoy.id).await {
                Ok(()) => {
                    info!(convoy = %convoy.id, ready = convoy.ready_count, "dispatched stranded convoy");
                    dispatched += 1;
                }
                Err(e) => warn!(convoy = %convoy.id, error = %e, "convoy dispatch failed"),
            }
        }
    }

    /// Step 10: the town is idle iff nothing is in progress anywhere.
    pub(crate) async fn is_town_idle(&self) -> bool {
        for dir in self.patrol_dirs() {
            match self.tracker.count_in_progress(&dir).await {
                Ok(0) => {}
                Ok(_) => return false,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "in-progress count failed");
                    return false;
                }
            }
        }
        true
    }

    /// Step 11: archive stale read mechanical mail in the coordinator inbox.
    async fn archive_coordinator_mail(&self) {
        match self.mail.archive_read(crate::escalation::COORDINATOR_ADDRESS, MAIL_ARCHIVE_AGE).await
        {
            Ok(0) => {}
            Ok(count) => info!(count, "archived coordinator mail"),
            Err(e) => warn!(error = %e, "mail archive failed"),
        }
    }
}

#[cfg(test)]
#[path = "patrol_tests.rs"]
mod tests;
