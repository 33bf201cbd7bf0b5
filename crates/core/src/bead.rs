// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent bead records from the issue tracker.
//!
//! A bead tagged "agent" is the tracker's view of one agent. Liveness is
//! never stored here; it is always derived from the multiplexer.

use crate::identity::{IdentityError, ParsedIdentity, RoleType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known `agent_state` values. The field is an open string because the
/// agents themselves write it; the daemon only ever compares against these.
pub mod agent_state {
    /// Another process is currently bringing the agent up.
    pub const SPAWNING: &str = "spawning";
    /// Waiting for the daemon to create the session.
    pub const QUEUED: &str = "queued";
    /// The agent reported itself stuck.
    pub const STUCK: &str = "stuck";
}

/// One agent bead as returned by the issue-tracker port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBead {
    pub id: String,
    pub role_type: RoleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rig: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Non-observable agent state (e.g. `spawning`, `stuck`). Never used to
    /// conclude liveness.
    #[serde(default)]
    pub agent_state: String,
    /// The single work bead bound to this agent; empty means no hooked work.
    #[serde(default)]
    pub hook_bead: String,
    pub updated_at: DateTime<Utc>,
}

impl AgentBead {
    /// Whether the agent currently holds hooked work.
    pub fn has_hook(&self) -> bool {
        !self.hook_bead.is_empty()
    }

    /// The parsed identity this bead describes.
    pub fn identity(&self) -> Result<ParsedIdentity, IdentityError> {
        ParsedIdentity::new(self.role_type, self.rig.clone(), self.agent_name.clone())
    }
}

#[cfg(test)]
#[path = "bead_tests.rs"]
mod tests;
