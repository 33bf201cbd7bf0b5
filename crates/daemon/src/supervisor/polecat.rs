// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Polecat crash recovery and hooked-work policing.
//!
//! A polecat is bound to a single hook bead. If its session dies while the
//! hook is set, the polecat crashed and is restarted under the normal
//! backoff guards. Bursts of deaths are treated as systemic (mass death)
//! and escalated once per window.

use crate::daemon::Daemon;
use crate::escalation::{EscalationCtx, EscalationKind};
use gt_adapters::{IssueTrackerPort, MailPort, MailPriority, MultiplexerPort};
use gt_core::bead::agent_state;
use gt_core::{AgentBead, Clock, ParsedIdentity, RoleType};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Grace for an agent bead still marked `spawning` by another process.
const SPAWNING_GRACE: Duration = Duration::from_secs(5 * 60);
/// Hooked work must show progress within this window.
const GUPP_STALL: Duration = Duration::from_secs(30 * 60);

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    /// Restart crashed polecats: worktree present, hook set, session dead.
    pub async fn detect_polecat_crashes(&self) {
        for rig in self.rig_names() {
            if self.rig_not_operational(&rig).await.is_some() {
                continue;
            }
            let rig_path = self.rig_path(&rig);
            let polecats_dir = rig_path.join("polecats");
            let Ok(entries) = std::fs::read_dir(&polecats_dir) else { continue };

            let beads = match self.tracker.list_agents(&rig_path).await {
                Ok(beads) => beads,
                Err(e) => {
                    warn!(rig = %rig, error = %e, "agent bead listing failed");
                    continue;
                }
            };

            for entry in entries.flatten() {
                if !entry.path().is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                self.recover_polecat_if_crashed(&rig, &name, &beads).await;
            }
        }
    }

    async fn recover_polecat_if_crashed(&self, rig: &str, name: &str, beads: &[AgentBead]) {
        let Ok(id) = ParsedIdentity::named(RoleType::Polecat, rig, name) else { return };
        let session = self.session_name_for(&id);

        match self.mux.has_session(&session).await {
            Ok(true) => return, // alive by the multiplexer is never a crash
            Ok(false) => {}
            Err(e) => {
                warn!(%session, error = %e, "session probe failed");
                return;
            }
        }

        let Some(bead) = find_polecat(beads, name) else { return };
        if !bead.has_hook() {
            return;
        }

        info!(polecat = %id, hook = %bead.hook_bead, "dead session with hooked work");
        self.note_session_death(rig, &session).await;

        // Another process may still be mid-spawn; give it its grace.
        let age = (self.clock.utc_now() - bead.updated_at).to_std().unwrap_or(Duration::ZERO);
        if bead.agent_state == agent_state::SPAWNING && age < SPAWNING_GRACE {
            debug!(polecat = %id, "skipping restart, spawn in progress elsewhere");
            return;
        }

        let key = id.dashed();
        if !self.restarts.can_restart(&key) {
            debug!(polecat = %id, "restart blocked by backoff or crash loop");
            return;
        }

        // TOCTOU closure: query the multiplexer once more right before spawn.
        if matches!(self.mux.has_session(&session).await, Ok(true)) {
            debug!(polecat = %id, "session reappeared before spawn, aborting");
            return;
        }

        match self.start_agent(&id, &session).await {
            Ok(()) => {
                self.note_restart(&id, &key).await;
            }
            Err(e) => {
                warn!(polecat = %id, error = %e, "polecat restart failed");
                // The observer hears about it only on failure.
                let witness = witness_address(rig);
                let body = serde_json::json!({
                    "polecat": id.slashed(),
                    "hook_bead": bead.hook_bead,
                    "error": e.to_string(),
                })
                .to_string();
                let subject = format!("POLECAT_RESTART_FAILED {}", bead.id);
                if let Err(e) =
                    self.mail.send(&witness, &subject, &body, MailPriority::High).await
                {
                    warn!(rig, error = %e, "failed to notify observer");
                }
            }
        }
    }

    /// Record a session death; a mass death emits one feed event and one
    /// escalation, then the deck clears.
    pub(crate) async fn note_session_death(&self, rig: &str, session: &str) {
        let Some(sessions) = self.deck.record_death(session) else { return };
        warn!(rig, count = sessions.len(), "mass death detected");
        self.feed.append(
            self.clock.utc_now(),
            "mass_death",
            &format!("{} sessions died within 30s in {rig}: {}", sessions.len(), sessions.join(", ")),
        );
        self.escalator
            .escalate(
                EscalationKind::MassDeath,
                EscalationCtx {
                    rig: Some(rig.to_string()),
                    count: Some(sessions.len() as u32),
                    window: Some("30s".to_string()),
                    sessions,
                    ..Default::default()
                },
            )
            .await;
    }

    /// Start queued polecats whose sessions do not exist yet.
    pub async fn spawn_pending_polecats(&self) {
        for rig in self.rig_names() {
            if self.rig_not_operational(&rig).await.is_some() {
                continue;
            }
            let rig_path = self.rig_path(&rig);
            let beads = match self.tracker.list_agents(&rig_path).await {
                Ok(beads) => beads,
                Err(_) => continue,
            };
            for bead in beads {
                if bead.role_type != RoleType::Polecat || bead.agent_state != agent_state::QUEUED
                {
                    continue;
                }
                let Ok(id) = bead.identity() else { continue };
                let session = self.session_name_for(&id);
                if matches!(self.mux.has_session(&session).await, Ok(true)) {
                    continue;
                }
                let key = id.dashed();
                if !self.restarts.can_restart(&key) {
                    continue;
                }
                match self.start_agent(&id, &session).await {
                    Ok(()) => {
                        info!(polecat = %id, "queued polecat spawned");
                        self.note_restart(&id, &key).await;
                    }
                    Err(e) => warn!(polecat = %id, error = %e, "queued spawn failed"),
                }
            }
        }
    }

    /// Agents with hooked work must progress: a live polecat whose bead has
    /// not been touched for 30 minutes gets reported to its observer.
    pub async fn check_gupp_violations(&self) {
        for rig in self.rig_names() {
            let rig_path = self.rig_path(&rig);
            let beads = match self.tracker.list_agents(&rig_path).await {
                Ok(beads) => beads,
                Err(_) => continue,
            };
            for bead in beads {
                if bead.role_type != RoleType::Polecat || !bead.has_hook() {
                    continue;
                }
                let Ok(id) = bead.identity() else { continue };
                let session = self.session_name_for(&id);
                if !matches!(self.mux.has_session(&session).await, Ok(true)) {
                    continue;
                }
                let age =
                    (self.clock.utc_now() - bead.updated_at).to_std().unwrap_or(Duration::ZERO);
                if age <= GUPP_STALL {
                    continue;
                }
                let body = serde_json::json!({
                    "polecat": id.slashed(),
                    "bead_id": bead.id,
                    "hook_bead": bead.hook_bead,
                    "updated_at": bead.updated_at,
                    "stalled_secs": age.as_secs(),
                })
                .to_string();
                let subject = format!("GUPP_VIOLATION {}", bead.id);
                if let Err(e) = self
                    .mail
                    .send(&witness_address(&rig), &subject, &body, MailPriority::High)
                    .await
                {
                    warn!(rig = %rig, error = %e, "failed to send GUPP violation");
                }
            }
        }
    }

    /// Hooked work assigned to a dead polecat with no worktree left to
    /// restart from must be surfaced to the observer.
    pub async fn check_orphaned_work(&self) {
        for rig in self.rig_names() {
            let rig_path = self.rig_path(&rig);
            let beads = match self.tracker.list_agents(&rig_path).await {
                Ok(beads) => beads,
                Err(_) => continue,
            };
            for bead in beads {
                if bead.role_type != RoleType::Polecat || !bead.has_hook() {
                    continue;
                }
                let Ok(id) = bead.identity() else { continue };
                let session = self.session_name_for(&id);
                if matches!(self.mux.has_session(&session).await, Ok(true)) {
                    continue;
                }
                // The crash path owns recovery while a worktree exists.
                let name = id.name.clone().unwrap_or_default();
                if rig_path.join("polecats").join(&name).exists() {
                    continue;
                }
                let body = serde_json::json!({
                    "polecat": id.slashed(),
                    "bead_id": bead.id,
                    "hook_bead": bead.hook_bead,
                })
                .to_string();
                let subject = format!("ORPHANED_WORK {}", bead.id);
                if let Err(e) = self
                    .mail
                    .send(&witness_address(&rig), &subject, &body, MailPriority::High)
                    .await
                {
                    warn!(rig = %rig, error = %e, "failed to send orphaned work notice");
                }
            }
        }
    }
}

fn find_polecat<'a>(beads: &'a [AgentBead], name: &str) -> Option<&'a AgentBead> {
    beads
        .iter()
        .find(|b| b.role_type == RoleType::Polecat && b.agent_name.as_deref() == Some(name))
}

fn witness_address(rig: &str) -> String {
    format!("{rig}/witness")
}

#[cfg(test)]
#[path = "polecat_tests.rs"]
mod tests;
