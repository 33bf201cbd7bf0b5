// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured escalations into the coordinator's inbox.
//!
//! Each escalation kind chooses a priority and a dedup key: per-agent for
//! most kinds, per-branch for merge conflicts, per-rig for mass death and
//! help requests. Bodies are JSON so the coordinator (or a human) can act
//! on the context mechanically.

use crate::notifier::DedupTable;
use gt_adapters::{MailPort, MailPriority};
use gt_core::Clock;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Address escalation mail is delivered to.
pub const COORDINATOR_ADDRESS: &str = "mayor";

/// Closed set of escalation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    CrashLoop,
    MassDeath,
    HelpRequest,
    MergeConflict,
    DoltUnhealthy,
    HealthFailures,
}

impl EscalationKind {
    /// Dedup slot name; doubles as the `kind` field of the body.
    pub fn slot(&self) -> &'static str {
        match self {
            EscalationKind::CrashLoop => "crash_loop",
            EscalationKind::MassDeath => "mass_death",
            EscalationKind::HelpRequest => "help_request",
            EscalationKind::MergeConflict => "merge_conflict",
            EscalationKind::DoltUnhealthy => "dolt_unhealthy",
            EscalationKind::HealthFailures => "health_failures",
        }
    }

    pub fn priority(&self) -> MailPriority {
        match self {
            EscalationKind::CrashLoop
            | EscalationKind::MassDeath
            | EscalationKind::DoltUnhealthy => MailPriority::Urgent,
            EscalationKind::HelpRequest
            | EscalationKind::MergeConflict
            | EscalationKind::HealthFailures => MailPriority::High,
        }
    }
}

impl fmt::Display for EscalationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slot())
    }
}

/// Context union across all escalation kinds; unset fields stay out of
/// the rendered body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EscalationCtx {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polecat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bead_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_bead: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sessions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_from: Option<String>,
}

impl EscalationCtx {
    /// Dedup key for a kind: per-agent, per-branch, or per-rig.
    pub fn dedup_key(&self, kind: EscalationKind) -> String {
        match kind {
            EscalationKind::MergeConflict => {
                self.branch.clone().or_else(|| self.rig.clone()).unwrap_or_default()
            }
            EscalationKind::MassDeath | EscalationKind::HelpRequest => {
                self.rig.clone().unwrap_or_default()
            }
            EscalationKind::CrashLoop
            | EscalationKind::HealthFailures
            | EscalationKind::DoltUnhealthy => self
                .bead_id
                .clone()
                .or_else(|| self.polecat.clone())
                .or_else(|| self.rig.clone())
                .unwrap_or_else(|| "town".to_string()),
        }
    }

    /// One-line human subject for a kind.
    pub fn subject(&self, kind: EscalationKind) -> String {
        let who = self
            .bead_id
            .as_deref()
            .or(self.polecat.as_deref())
            .or(self.rig.as_deref())
            .unwrap_or("town");
        match kind {
            EscalationKind::CrashLoop => {
                format!("crash loop: {who} frozen after repeated restarts")
            }
            EscalationKind::MassDeath => format!(
                "mass death: {} sessions died within {} in {who}",
                self.count.unwrap_or(0),
                self.window.as_deref().unwrap_or("30s"),
            ),
            EscalationKind::HelpRequest => format!(
                "unhandled witness mail in {who}: {}",
                self.help_subject.as_deref().unwrap_or("unknown subject"),
            ),
            EscalationKind::MergeConflict => format!(
                "merge failed on {} in {who}",
                self.branch.as_deref().unwrap_or("unknown branch"),
            ),
            EscalationKind::DoltUnhealthy => format!(
                "dolt server unhealthy: {} restarts within {}",
                self.count.unwrap_or(0),
                self.window.as_deref().unwrap_or("the restart window"),
            ),
            EscalationKind::HealthFailures => format!(
                "{who} failed {} consecutive health checks",
                self.failure_count.unwrap_or(0),
            ),
        }
    }
}

#[derive(Serialize)]
struct EscalationBody<'a> {
    kind: EscalationKind,
    priority: &'static str,
    #[serde(flatten)]
    ctx: &'a EscalationCtx,
}

/// Deduplicating escalation sender.
pub struct Escalator<P: MailPort, C: Clock> {
    mail: P,
    dedup: DedupTable<C>,
}

impl<P: MailPort, C: Clock> Escalator<P, C> {
    pub fn new(mail: P, dedup: DedupTable<C>) -> Self {
        Self { mail, dedup }
    }

    /// Send unless suppressed by the 30-minute `(kind, key)` window.
    /// Returns whether mail actually went out. Never fatal.
    pub async fn escalate(&self, kind: EscalationKind, ctx: EscalationCtx) -> bool {
        let key = ctx.dedup_key(kind);
        match self.dedup.ready(&key, kind.slot()) {
            Ok(true) => {}
            Ok(false) => {
                info!(kind = %kind, key, "escalation suppressed by dedup window");
                return false;
            }
            Err(e) => {
                warn!(kind = %kind, key, error = %e, "dedup table unavailable, sending anyway");
            }
        }

        let subject = format!("ESCALATION: {}", ctx.subject(kind));
        let body = EscalationBody { kind, priority: kind.priority().as_str(), ctx: &ctx };
        let body = serde_json::to_string_pretty(&body).unwrap_or_else(|_| "{}".to_string());

        match self.mail.send(COORDINATOR_ADDRESS, &subject, &body, kind.priority()).await {
            Ok(()) => {
                info!(kind = %kind, key, %subject, "escalation sent");
                true
            }
            Err(e) => {
                warn!(kind = %kind, key, error = %e, "failed to send escalation");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "escalation_tests.rs"]
mod tests;
