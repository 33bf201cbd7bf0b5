// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The heartbeat: one ordered supervision pass over the whole town.

use crate::daemon::Daemon;
use crate::dolt::DoltEvent;
use crate::escalation::{EscalationCtx, EscalationKind};
use fs2::FileExt;
use gt_adapters::{IssueTrackerPort, MailPort, MultiplexerPort};
use gt_core::{Clock, ParsedIdentity, RoleType};
use tracing::{info, warn};

/// What one heartbeat did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// The orchestrator held the shutdown lock; nothing ran.
    pub skipped: bool,
    pub town_idle: bool,
}

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    /// Run one full heartbeat in the contractual order.
    pub async fn heartbeat(&self) -> HeartbeatReport {
        if self.shutdown_in_progress() {
            info!("shutdown lock held, skipping heartbeat");
            return HeartbeatReport { skipped: true, town_idle: false };
        }

        self.ensure_dolt().await;

        // Session patrols. A disabled patrol kills its leftovers so a
        // disabled but running instance cannot exert its own will.
        if self.config.patrols.deacon.enabled {
            self.ensure_agent(&town_identity(RoleType::Deacon)).await;
        } else {
            self.kill_disabled_role(RoleType::Deacon, None).await;
        }

        for rig in self.rig_names() {
            if self.config.patrols.witness.covers(&rig) {
                if let Ok(id) = ParsedIdentity::rig_singleton(RoleType::Witness, &rig) {
                    self.ensure_agent(&id).await;
                }
            } else {
                self.kill_disabled_role(RoleType::Witness, Some(&rig)).await;
            }
            if self.config.patrols.refinery.covers(&rig) {
                if let Ok(id) = ParsedIdentity::rig_singleton(RoleType::Refinery, &rig) {
                    self.ensure_agent(&id).await;
                }
            } else {
                self.kill_disabled_role(RoleType::Refinery, Some(&rig)).await;
            }
        }

        self.ensure_agent(&town_identity(RoleType::Mayor)).await;

        self.spawn_pending_polecats().await;
        self.process_lifecycle_requests().await;

        let patrol = self.run_patrol().await;

        self.check_gupp_violations().await;
        self.check_orphaned_work().await;
        self.detect_polecat_crashes().await;
        self.drain_witness_inboxes().await;
        self.clean_orphan_processes().await;
        self.prune_polecat_branches().await;

        self.save_heartbeat_state();

        HeartbeatReport { skipped: false, town_idle: patrol.town_idle }
    }

    /// Ensure the managed DB and surface its events. Called from both the
    /// heartbeat and the independent health ticker; the manager itself is
    /// idempotent.
    pub async fn ensure_dolt(&self) {
        let Some(dolt) = &self.dolt else { return };
        for event in dolt.ensure_running().await {
            match event {
                DoltEvent::Started => {
                    self.feed.append(self.clock.utc_now(), "dolt", "server started");
                }
                DoltEvent::Restarted { delay } => {
                    self.feed.append(
                        self.clock.utc_now(),
                        "dolt",
                        &format!("server restarted after {}s backoff", delay.as_secs()),
                    );
                }
                DoltEvent::WindowExceeded { count, window } => {
                    self.feed.append(
                        self.clock.utc_now(),
                        "dolt",
                        &format!("unhealthy: {count} restarts within {}s", window.as_secs()),
                    );
                    self.escalator
                        .escalate(
                            EscalationKind::DoltUnhealthy,
                            EscalationCtx {
                                count: Some(count),
                                window: Some(format!("{}s", window.as_secs())),
                                ..Default::default()
                            },
                        )
                        .await;
                }
                DoltEvent::Recovered => {
                    self.feed.append(self.clock.utc_now(), "dolt", "server recovered");
                }
            }
        }
    }

    /// Whether the orchestrator currently holds `daemon/shutdown.lock`.
    pub(crate) fn shutdown_in_progress(&self) -> bool {
        let path = self.paths.shutdown_lock_path();
        if !path.exists() {
            return false;
        }
        match std::fs::OpenOptions::new().write(true).open(&path) {
            Ok(file) => {
                if file.try_lock_exclusive().is_ok() {
                    let _ = file.unlock();
                    false
                } else {
                    true
                }
            }
            // Present but unopenable reads as held; skipping a heartbeat
            // is cheaper than fighting a shutdown.
            Err(_) => true,
        }
    }

    fn save_heartbeat_state(&self) {
        let mut state = self.state.load().unwrap_or_default();
        let now = self.clock.utc_now();
        state.running = true;
        state.pid = std::process::id();
        if state.started_at.is_none() {
            state.started_at = Some(now);
        }
        state.last_heartbeat = Some(now);
        state.heartbeat_count += 1;
        if let Err(e) = self.state.save(&state) {
            warn!(error = %e, "failed to save daemon state");
        }
    }

    /// Mark the state file stopped on graceful shutdown.
    pub fn save_stopped_state(&self) {
        let mut state = self.state.load().unwrap_or_default();
        state.running = false;
        if let Err(e) = self.state.save(&state) {
            warn!(error = %e, "failed to save final daemon state");
        }
    }
}

fn town_identity(role: RoleType) -> ParsedIdentity {
    // Mayor/Deacon with no rig and no name always validate.
    ParsedIdentity { role, rig: None, name: None }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
