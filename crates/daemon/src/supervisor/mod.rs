// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session supervisors.
//!
//! One `ensure_agent` contract covers every role: triage the session
//! (healthy / zombie / hung / missing), kill degraded sessions with their
//! descendants, gate restarts on the restart tracker, and bring fresh
//! sessions up with the role's work directory, environment, theming, and
//! startup beacon.

mod polecat;

use crate::daemon::Daemon;
use crate::escalation::{EscalationCtx, EscalationKind};
use gt_adapters::mux::SHELLS;
use gt_adapters::{IssueTrackerPort, MailPort, MultiplexerPort, MuxError, SessionHealth};
use gt_core::{Beacon, Clock, ParsedIdentity, RoleType};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a fresh session gets to swap its shell for the agent runtime.
const COMMAND_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of an ensure pass for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// Session alive with a live agent; nothing to do.
    Healthy,
    /// A fresh session was created and the restart recorded.
    Started,
    /// Backoff window still open; no spawn.
    BackedOff,
    /// Frozen in a crash loop until an operator clears it.
    CrashLooped,
    /// The rig is parked/docked or blocks auto-restart.
    NotOperational(String),
    /// A port failed; logged, retried next tick.
    Failed(String),
}

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    /// Ensure one agent is running, per the supervisor contract.
    pub async fn ensure_agent(&self, id: &ParsedIdentity) -> EnsureOutcome {
        if let Some(rig) = &id.rig {
            if let Some(reason) = self.rig_not_operational(rig).await {
                debug!(agent = %id, rig, reason, "rig not operational, skipping ensure");
                return EnsureOutcome::NotOperational(reason);
            }
        }

        let session = self.session_name_for(id);
        let key = id.dashed();

        let health = match self.mux.session_health(&session).await {
            Ok(health) => health,
            Err(e) => {
                warn!(agent = %id, error = %e, "session health query failed");
                return EnsureOutcome::Failed(e.to_string());
            }
        };

        match health {
            SessionHealth::Healthy => {
                // Alive by the multiplexer is never concluded to be a crash.
                if let Err(e) = self.restarts.record_success(&key) {
                    warn!(agent = %id, error = %e, "failed to persist restart success");
                }
                self.health.record_success(&key);
                return EnsureOutcome::Healthy;
            }
            SessionHealth::Zombie | SessionHealth::Hung => {
                warn!(agent = %id, session, state = ?health, "killing degraded session");
                if let Err(e) = self.mux.kill_session_with_processes(&session).await {
                    warn!(agent = %id, error = %e, "failed to kill degraded session");
                }
            }
            SessionHealth::Missing => {}
        }

        if !self.restarts.can_restart(&key) {
            if self.restarts.in_crash_loop(&key) {
                warn!(agent = %id, "crash loop active, refusing restart until cleared");
                return EnsureOutcome::CrashLooped;
            }
            let remaining = self.restarts.backoff_remaining(&key).unwrap_or_default();
            info!(agent = %id, remaining_secs = remaining.as_secs(), "restart backed off");
            return EnsureOutcome::BackedOff;
        }

        match self.start_agent(id, &session).await {
            Ok(()) => {
                self.health.record_success(&key);
                self.note_restart(id, &key).await;
                EnsureOutcome::Started
            }
            Err(e) => {
                warn!(agent = %id, error = %e, "failed to start agent session");
                let failures = self.health.record_failure(&key);
                if self.health.just_crossed(failures) {
                    self.escalator
                        .escalate(
                            EscalationKind::HealthFailures,
                            EscalationCtx {
                                rig: id.rig.clone(),
                                bead_id: Some(id.bead_id(self.prefix_for(id))),
                                failure_count: Some(failures),
                                error_details: Some(e.to_string()),
                                ..Default::default()
                            },
                        )
                        .await;
                }
                EnsureOutcome::Failed(e.to_string())
            }
        }
    }

    /// Record a restart; entering a crash loop escalates once.
    pub(crate) async fn note_restart(&self, id: &ParsedIdentity, key: &str) {
        let outcome = match self.restarts.record_restart(key) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(agent = %id, error = %e, "failed to persist restart record");
                return;
            }
        };
        self.feed.append(self.clock.utc_now(), "restart", &id.slashed());
        if outcome.entered_crash_loop {
            warn!(agent = %id, count = outcome.restart_count, "agent entered a crash loop");
            self.feed.append(self.clock.utc_now(), "crash_loop", &id.slashed());
            self.escalator
                .escalate(
                    EscalationKind::CrashLoop,
                    EscalationCtx {
                        rig: id.rig.clone(),
                        bead_id: Some(id.bead_id(self.prefix_for(id))),
                        count: Some(outcome.restart_count),
                        ..Default::default()
                    },
                )
                .await;
        }
    }

    /// The start path: fresh session, role env, theming, beacon, readiness.
    pub(crate) async fn start_agent(
        &self,
        id: &ParsedIdentity,
        session: &str,
    ) -> Result<(), MuxError> {
        let work_dir = id.work_dir(&self.paths.root, &self.rigs);
        std::fs::create_dir_all(&work_dir)?;

        if id.spec().needs_pre_sync {
            pre_sync(&work_dir).await;
        }

        self.mux.ensure_session_fresh(session, &work_dir).await?;
        for (key, value) in id.session_env(&self.paths.root) {
            self.mux.set_environment(session, &key, &value).await?;
        }
        self.mux.set_option(session, "status-style", id.spec().theme.status_style).await?;
        self.mux.set_pane_died_hook(session, &Uuid::new_v4().to_string()).await?;

        let beacon = Beacon::new("daemon", &id.slashed(), "session recovery");
        let command = id.start_command(&self.runtime, Some(&beacon));
        self.mux.send_keys(session, &command).await?;
        self.mux.wait_for_command(session, SHELLS, COMMAND_READY_TIMEOUT).await?;

        // Accept a possible first-run interactive permissions warning.
        self.mux.send_keys(session, "").await?;

        info!(agent = %id, session, "agent session started");
        Ok(())
    }

    /// `(operational, reason)` for a rig: registry status, rig bead labels,
    /// and the auto-restart switch.
    pub(crate) async fn rig_not_operational(&self, rig: &str) -> Option<String> {
        if let Some(entry) = self.rigs.get(rig) {
            if let Some(reason) = entry.local_block() {
                return Some(reason);
            }
        }
        let rig_path = self.rig_path(rig);
        match self.tracker.rig_labels(&rig_path, rig).await {
            Ok(labels) => {
                for label in labels {
                    if label == "status:docked" || label == "status:parked" {
                        return Some(format!("rig bead labelled {label}"));
                    }
                }
                None
            }
            Err(e) => {
                // Tracker trouble never parks a rig by itself.
                debug!(rig, error = %e, "rig label lookup failed");
                None
            }
        }
    }

    /// Kill leftover sessions for a disabled role so a disabled but
    /// running instance cannot exert its own will.
    pub(crate) async fn kill_disabled_role(&self, role: RoleType, rig: Option<&str>) {
        let id = match (role, rig) {
            (RoleType::Mayor | RoleType::Deacon, _) => ParsedIdentity::town(role),
            (_, Some(rig)) => ParsedIdentity::rig_singleton(role, rig),
            (_, None) => return,
        };
        let Ok(id) = id else { return };
        let session = self.session_name_for(&id);
        match self.mux.has_session(&session).await {
            Ok(true) => {
                info!(%session, role = %role, "killing session for disabled role");
                if let Err(e) = self.mux.kill_session_with_processes(&session).await {
                    warn!(%session, error = %e, "failed to kill disabled session");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(%session, error = %e, "session probe failed"),
        }
    }
}

/// Best-effort fast-forward of a role clone before its agent starts.
async fn pre_sync(work_dir: &std::path::Path) {
    if !work_dir.join(".git").exists() {
        return;
    }
    let result = tokio::process::Command::new("git")
        .args(["-C", &work_dir.display().to_string(), "pull", "--ff-only", "--quiet"])
        .output()
        .await;
    match result {
        Ok(output) if !output.status.success() => {
            debug!(
                dir = %work_dir.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "pre-sync pull failed"
            );
        }
        Err(e) => debug!(dir = %work_dir.display(), error = %e, "pre-sync spawn failed"),
        _ => {}
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
