// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mail port.
//!
//! Protocol mail between agents flows through the `gt mail` CLI. The
//! daemon drains unattended inboxes and emits escalations through this
//! port; it never interprets message bodies beyond the protocol subjects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

/// Errors from mail operations.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail binary not found: {0}")]
    BinaryNotFound(String),

    #[error("failed to run mail command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("mail command failed: {0}")]
    CommandFailed(String),

    #[error("bad mail output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Delivery priority for outgoing mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl MailPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailPriority::Low => "low",
            MailPriority::Normal => "normal",
            MailPriority::High => "high",
            MailPriority::Urgent => "urgent",
        }
    }
}

/// One message in an inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub read: bool,
    pub sent_at: DateTime<Utc>,
}

impl MailMessage {
    /// Age of the message relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.sent_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Operations the daemon needs from the mail system.
#[async_trait]
pub trait MailPort: Clone + Send + Sync + 'static {
    /// Full inbox of an address, read and unread.
    async fn inbox(&self, address: &str) -> Result<Vec<MailMessage>, MailError>;

    /// Delete one message from an inbox.
    async fn delete_message(&self, address: &str, id: &str) -> Result<(), MailError>;

    /// Send a message.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        priority: MailPriority,
    ) -> Result<(), MailError>;

    /// Archive read mechanical mail older than the cutoff; returns how many.
    async fn archive_read(&self, address: &str, older_than: Duration) -> Result<u32, MailError>;
}

/// Real adapter over the `gt mail` CLI.
#[derive(Clone)]
pub struct GtMailCli {
    gt: PathBuf,
}

impl GtMailCli {
    pub fn resolve() -> Result<Self, MailError> {
        let gt =
            which::which("gt").map_err(|_| MailError::BinaryNotFound("gt".to_string()))?;
        Ok(Self { gt })
    }

    pub fn with_binary(gt: PathBuf) -> Self {
        Self { gt }
    }

    async fn run_ok(&self, args: &[&str]) -> Result<String, MailError> {
        let output = tokio::process::Command::new(&self.gt).args(args).output().await?;
        if !output.status.success() {
            return Err(MailError::CommandFailed(format!(
                "gt {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl MailPort for GtMailCli {
    async fn inbox(&self, address: &str) -> Result<Vec<MailMessage>, MailError> {
        let out = self.run_ok(&["mail", "inbox", address, "--json"]).await?;
        if out.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&out)?)
    }

    async fn delete_message(&self, address: &str, id: &str) -> Result<(), MailError> {
        self.run_ok(&["mail", "delete", id, "--inbox", address]).await?;
        Ok(())
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        priority: MailPriority,
    ) -> Result<(), MailError> {
        // Body goes over stdin so arbitrary JSON survives the shell.
        let mut child = tokio::process::Command::new(&self.gt)
            .args([
                "mail",
                "send",
                "--to",
                to,
                "--subject",
                subject,
                "--priority",
                priority.as_str(),
                "--body",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(stdin) = child.stdin.as_mut() {
            use tokio::io::AsyncWriteExt;
            stdin.write_all(body.as_bytes()).await?;
        }
        drop(child.stdin.take());

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(MailError::CommandFailed(format!(
                "mail send to {to}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn archive_read(&self, address: &str, older_than: Duration) -> Result<u32, MailError> {
        let cutoff = format!("{}s", older_than.as_secs());
        let out = self
            .run_ok(&["mail", "archive", "--inbox", address, "--read", "--older-than", &cutoff])
            .await?;
        Ok(out.trim().parse().unwrap_or(0))
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Recorded outgoing mail.
    #[derive(Debug, Clone)]
    pub struct SentMail {
        pub to: String,
        pub subject: String,
        pub body: String,
        pub priority: MailPriority,
    }

    #[derive(Default)]
    struct FakeMailState {
        inboxes: HashMap<String, Vec<MailMessage>>,
        sent: Vec<SentMail>,
        archived: Vec<(String, Duration)>,
        now: Option<DateTime<Utc>>,
    }

    /// Fake mail system: per-address queues, recorded sends.
    #[derive(Clone, Default)]
    pub struct FakeMail {
        inner: Arc<Mutex<FakeMailState>>,
    }

    impl FakeMail {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pin the timestamp used for messages pushed via [`push`].
        pub fn set_now(&self, now: DateTime<Utc>) {
            self.inner.lock().now = Some(now);
        }

        /// Drop a message into an inbox.
        pub fn push(&self, address: &str, id: &str, subject: &str, body: &str) {
            let now = self.inner.lock().now.unwrap_or_else(Utc::now);
            self.push_message(
                address,
                MailMessage {
                    id: id.to_string(),
                    from: "test".to_string(),
                    to: address.to_string(),
                    subject: subject.to_string(),
                    body: body.to_string(),
                    read: false,
                    sent_at: now,
                },
            );
        }

        pub fn push_message(&self, address: &str, message: MailMessage) {
            self.inner.lock().inboxes.entry(address.to_string()).or_default().push(message);
        }

        /// Remaining messages in an inbox.
        pub fn inbox_of(&self, address: &str) -> Vec<MailMessage> {
            self.inner.lock().inboxes.get(address).cloned().unwrap_or_default()
        }

        /// Everything sent through the port.
        pub fn sent(&self) -> Vec<SentMail> {
            self.inner.lock().sent.clone()
        }

        /// Sent mail filtered to one recipient.
        pub fn sent_to(&self, to: &str) -> Vec<SentMail> {
            self.inner.lock().sent.iter().filter(|m| m.to == to).cloned().collect()
        }

        pub fn archive_calls(&self) -> Vec<(String, Duration)> {
            self.inner.lock().archived.clone()
        }
    }

    #[async_trait]
    impl MailPort for FakeMail {
        async fn inbox(&self, address: &str) -> Result<Vec<MailMessage>, MailError> {
            Ok(self.inbox_of(address))
        }

        async fn delete_message(&self, address: &str, id: &str) -> Result<(), MailError> {
            let mut state = self.inner.lock();
            if let Some(inbox) = state.inboxes.get_mut(address) {
                inbox.retain(|m| m.id != id);
            }
            Ok(())
        }

        async fn send(
            &self,
            to: &str,
            subject: &str,
            body: &str,
            priority: MailPriority,
        ) -> Result<(), MailError> {
            self.inner.lock().sent.push(SentMail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
                priority,
            });
            Ok(())
        }

        async fn archive_read(
            &self,
            address: &str,
            older_than: Duration,
        ) -> Result<u32, MailError> {
            let mut state = self.inner.lock();
            state.archived.push((address.to_string(), older_than));
            let Some(inbox) = state.inboxes.get_mut(address) else {
                return Ok(0);
            };
            let before = inbox.len();
            inbox.retain(|m| !m.read);
            Ok((before - inbox.len()) as u32)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeMail, SentMail};

#[cfg(test)]
#[path = "mail_tests.rs"]
mod tests;
