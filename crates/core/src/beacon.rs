// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup beacons.
//!
//! A beacon is the short structured wake-up instruction included in an
//! agent's startup command line so a restarted agent comes up with a
//! precise task instead of blank context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A wake-up instruction for a freshly started agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub id: String,
    /// Slashed identity of the process that restarted the agent.
    pub sender: String,
    /// Slashed identity of the agent being started.
    pub recipient: String,
    pub topic: String,
}

impl Beacon {
    pub fn new(sender: &str, recipient: &str, topic: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            topic: topic.to_string(),
        }
    }

    /// Render as the single-line instruction sent on the command line.
    pub fn render(&self) -> String {
        format!(
            "[beacon {}] You are {}. {} restarted your session. Topic: {}. \
             Check your inbox and your hooked work before anything else.",
            self.id, self.recipient, self.sender, self.topic
        )
    }
}
