// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle request processing.
//!
//! The coordinator's (`deacon/`) inbox accepts `LIFECYCLE:` requests.
//! Claim then execute: the message is deleted before the action runs, so a
//! failed action is lost and the sender must re-request. Messages older
//! than six hours are expired without effect.

use crate::daemon::Daemon;
use gt_adapters::{IssueTrackerPort, MailMessage, MailPort, MultiplexerPort};
use gt_core::{Clock, ParsedIdentity, RoleType};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Subject prefix the processor accepts.
const LIFECYCLE_PREFIX: &str = "LIFECYCLE:";
/// Requests older than this are deleted without effect.
const MAX_REQUEST_AGE: Duration = Duration::from_secs(6 * 3600);
/// Pause between killing a session and recreating it on cycle.
const CYCLE_GRACE: Duration = Duration::from_millis(500);

/// Address whose inbox carries lifecycle requests.
pub(crate) const LIFECYCLE_INBOX: &str = "deacon";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleAction {
    Shutdown,
    Cycle,
}

impl LifecycleAction {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shutdown" | "stop" => Some(LifecycleAction::Shutdown),
            "restart" | "cycle" => Some(LifecycleAction::Cycle),
            _ => None,
        }
    }
}

#[derive(Deserialize, Default)]
struct LifecycleBody {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    agent: Option<String>,
}

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    /// Read the coordinator inbox and run any pending lifecycle requests.
    pub async fn process_lifecycle_requests(&self) {
        let messages = match self.mail.inbox(LIFECYCLE_INBOX).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "lifecycle inbox read failed");
                return;
            }
        };

        for message in messages {
            if !message.subject.trim_start().starts_with(LIFECYCLE_PREFIX) {
                continue;
            }
            self.process_lifecycle_message(&message).await;
        }
    }

    async fn process_lifecycle_message(&self, message: &MailMessage) {
        if message.age(self.clock.utc_now()) > MAX_REQUEST_AGE {
            info!(message_id = %message.id, "expiring stale lifecycle request");
            self.delete_lifecycle_message(message).await;
            return;
        }

        let body: LifecycleBody = serde_json::from_str(&message.body).unwrap_or_default();
        let action = body
            .action
            .as_deref()
            .and_then(LifecycleAction::parse)
            // JSON body first, then the literal body, then the subject tail
            .or_else(|| LifecycleAction::parse(message.body.trim()))
            .or_else(|| {
                LifecycleAction::parse(
                    message.subject.trim_start().trim_start_matches(LIFECYCLE_PREFIX),
                )
            });

        let target = match &body.agent {
            Some(agent) => match ParsedIdentity::parse_slashed(agent) {
                Ok(id) => id,
                Err(e) => {
                    warn!(message_id = %message.id, agent = %agent, error = %e, "bad lifecycle target");
                    self.delete_lifecycle_message(message).await;
                    return;
                }
            },
            None => match ParsedIdentity::town(RoleType::Deacon) {
                Ok(id) => id,
                Err(_) => return,
            },
        };

        // Claim BEFORE execute. A claimed request that fails is not
        // retried; re-requesting is the sender's responsibility.
        self.delete_lifecycle_message(message).await;

        let Some(action) = action else {
            warn!(message_id = %message.id, body = %message.body, "unparseable lifecycle action");
            return;
        };

        if let Err(e) = self.execute_lifecycle(action, &target).await {
            warn!(
                message_id = %message.id,
                action = ?action,
                target = %target,
                error = %e,
                "lifecycle action failed after claim"
            );
        }
    }

    async fn delete_lifecycle_message(&self, message: &MailMessage) {
        if let Err(e) = self.mail.delete_message(LIFECYCLE_INBOX, &message.id).await {
            warn!(message_id = %message.id, error = %e, "failed to claim lifecycle request");
        }
    }

    async fn execute_lifecycle(
        &self,
        action: LifecycleAction,
        target: &ParsedIdentity,
    ) -> Result<(), String> {
        let session = self.session_name_for(target);
        let alive = self.mux.has_session(&session).await.map_err(|e| e.to_string())?;

        match action {
            LifecycleAction::Shutdown => {
                if alive {
                    self.mux
                        .kill_session_with_processes(&session)
                        .await
                        .map_err(|e| e.to_string())?;
                    info!(target = %target, %session, "lifecycle shutdown complete");
                }
                Ok(())
            }
            LifecycleAction::Cycle => {
                if alive {
                    self.mux
                        .kill_session_with_processes(&session)
                        .await
                        .map_err(|e| e.to_string())?;
                    tokio::time::sleep(CYCLE_GRACE).await;
                }
                self.start_agent(target, &session).await.map_err(|e| e.to_string())?;
                self.note_restart(target, &target.dashed()).await;
                info!(target = %target, %session, "lifecycle cycle complete");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_requests_tests.rs"]
mod tests;
