// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Witness inbox drain.
//!
//! Per rig, per tick: classify each unread message against the closed
//! protocol set, dispatch recognized ones, and delete them. The inbox is
//! a work queue where processed means gone. Unrecognized subjects are kept
//! in place and escalated for human inspection.

use crate::daemon::Daemon;
use crate::escalation::{EscalationCtx, EscalationKind};
use gt_adapters::{IssueTrackerPort, MailMessage, MailPort, MultiplexerPort};
use gt_core::{Clock, ParsedIdentity};
use serde::Deserialize;
use tracing::{info, warn};

/// The closed protocol set understood at witness inboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    PolecatDone,
    LifecycleShutdown,
    Help,
    Merged,
    MergeFailed,
    SwarmStart,
    Handoff,
    MergeReady,
}

impl Protocol {
    /// Classify a subject; None means not part of the protocol.
    pub fn classify(subject: &str) -> Option<Protocol> {
        let subject = subject.trim_start();
        if subject.starts_with("POLECAT_DONE") {
            Some(Protocol::PolecatDone)
        } else if subject.starts_with("LIFECYCLE:Shutdown") {
            Some(Protocol::LifecycleShutdown)
        } else if subject.starts_with("HELP:") {
            Some(Protocol::Help)
        } else if subject.starts_with("MERGE_FAILED") {
            Some(Protocol::MergeFailed)
        } else if subject.starts_with("MERGE_READY") {
            Some(Protocol::MergeReady)
        } else if subject.starts_with("MERGED") {
            Some(Protocol::Merged)
        } else if subject.starts_with("SWARM_START") {
            Some(Protocol::SwarmStart)
        } else if subject.starts_with("HANDOFF") {
            Some(Protocol::Handoff)
        } else {
            None
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Protocol::PolecatDone => "polecat_done",
            Protocol::LifecycleShutdown => "lifecycle_shutdown",
            Protocol::Help => "help_forwarded",
            Protocol::Merged => "merged",
            Protocol::MergeFailed => "merge_failed",
            Protocol::SwarmStart => "swarm_start",
            Protocol::Handoff => "discarded",
            Protocol::MergeReady => "discarded",
        }
    }
}

#[derive(Deserialize, Default)]
struct ProtocolBody {
    #[serde(default)]
    agent: Option<String>,
    #[serde(default)]
    branch: Option<String>,
}

fn parse_body(body: &str) -> ProtocolBody {
    serde_json::from_str(body).unwrap_or_default()
}

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    /// Drain every rig's witness inbox.
    pub async fn drain_witness_inboxes(&self) {
        for rig in self.rig_names() {
            self.drain_witness_inbox(&rig).await;
        }
    }

    async fn drain_witness_inbox(&self, rig: &str) {
        let address = format!("{rig}/witness");
        let messages = match self.mail.inbox(&address).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(rig, error = %e, "witness inbox read failed");
                return;
            }
        };

        for message in messages {
            if message.read {
                continue;
            }
            match Protocol::classify(&message.subject) {
                Some(protocol) => {
                    let result = self.dispatch(rig, protocol, &message).await;
                    if let Err(e) = &result {
                        // Handlers are best-effort; side effects get retried
                        // through the tracker on later ticks.
                        warn!(
                            rig,
                            message_id = %message.id,
                            action = protocol.action(),
                            error = %e,
                            "witness handler failed"
                        );
                    }
                    // Processed means gone, handler error or not.
                    if let Err(e) = self.mail.delete_message(&address, &message.id).await {
                        warn!(rig, message_id = %message.id, error = %e, "delete failed");
                    }
                }
                None => {
                    info!(
                        rig,
                        message_id = %message.id,
                        subject = %message.subject,
                        "unrecognized witness mail, escalating"
                    );
                    self.escalator
                        .escalate(
                            EscalationKind::HelpRequest,
                            EscalationCtx {
                                rig: Some(rig.to_string()),
                                help_subject: Some(message.subject.clone()),
                                help_from: Some(message.from.clone()),
                                ..Default::default()
                            },
                        )
                        .await;
                }
            }
        }
    }

    async fn dispatch(
        &self,
        rig: &str,
        protocol: Protocol,
        message: &MailMessage,
    ) -> Result<(), String> {
        match protocol {
            Protocol::PolecatDone => {
                self.feed.append(
                    self.clock.utc_now(),
                    "polecat_done",
                    message.subject.trim_start_matches("POLECAT_DONE").trim(),
                );
                Ok(())
            }
            Protocol::LifecycleShutdown => {
                let body = parse_body(&message.body);
                let target = body.agent.as_deref().unwrap_or(&message.from);
                let id = ParsedIdentity::parse_slashed(target).map_err(|e| e.to_string())?;
                let session = self.session_name_for(&id);
                if matches!(self.mux.has_session(&session).await, Ok(true)) {
                    self.mux
                        .kill_session_with_processes(&session)
                        .await
                        .map_err(|e| e.to_string())?;
                    info!(rig, %session, "shut down on protocol request");
                }
                Ok(())
            }
            Protocol::Help => {
                self.escalator
                    .escalate(
                        EscalationKind::HelpRequest,
                        EscalationCtx {
                            rig: Some(rig.to_string()),
                            help_subject: Some(message.subject.clone()),
                            help_from: Some(message.from.clone()),
                            ..Default::default()
                        },
                    )
                    .await;
                Ok(())
            }
            Protocol::Merged => {
                self.feed.append(
                    self.clock.utc_now(),
                    "merged",
                    message.subject.trim_start_matches("MERGED").trim(),
                );
                Ok(())
            }
            Protocol::MergeFailed => {
                let body = parse_body(&message.body);
                let branch = body.branch.or_else(|| {
                    let rest = message.subject.trim_start_matches("MERGE_FAILED").trim();
                    (!rest.is_empty()).then(|| rest.to_string())
                });
                self.escalator
                    .escalate(
                        EscalationKind::MergeConflict,
                        EscalationCtx {
                            rig: Some(rig.to_string()),
                            branch,
                            error_details: Some(message.body.clone()),
                            ..Default::default()
                        },
                    )
                    .await;
                Ok(())
            }
            Protocol::SwarmStart => {
                self.feed.append(
                    self.clock.utc_now(),
                    "swarm_start",
                    message.subject.trim_start_matches("SWARM_START").trim(),
                );
                Ok(())
            }
            // Recognized so they drain, but deliberately inert.
            Protocol::Handoff | Protocol::MergeReady => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "witness_tests.rs"]
mod tests;
