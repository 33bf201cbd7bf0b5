// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared across crates' tests.

use crate::bead::AgentBead;
use crate::identity::RoleType;
use chrono::{DateTime, Utc};

/// Builder for [`AgentBead`] test fixtures.
pub struct AgentBeadBuilder {
    bead: AgentBead,
}

impl AgentBeadBuilder {
    pub fn polecat(rig: &str, name: &str) -> Self {
        Self {
            bead: AgentBead {
                id: format!("gt-{rig}-polecat-{name}"),
                role_type: RoleType::Polecat,
                rig: Some(rig.to_string()),
                agent_name: Some(name.to_string()),
                agent_state: String::new(),
                hook_bead: String::new(),
                updated_at: Utc::now(),
            },
        }
    }

    pub fn singleton(role: RoleType, rig: &str) -> Self {
        Self {
            bead: AgentBead {
                id: format!("gt-{rig}-{role}"),
                role_type: role,
                rig: Some(rig.to_string()),
                agent_name: None,
                agent_state: String::new(),
                hook_bead: String::new(),
                updated_at: Utc::now(),
            },
        }
    }

    pub fn hook(mut self, hook_bead: &str) -> Self {
        self.bead.hook_bead = hook_bead.to_string();
        self
    }

    pub fn state(mut self, agent_state: &str) -> Self {
        self.bead.agent_state = agent_state.to_string();
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.bead.updated_at = at;
        self
    }

    pub fn build(self) -> AgentBead {
        self.bead
    }
}
