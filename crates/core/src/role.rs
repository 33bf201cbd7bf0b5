// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The role table.
//!
//! One table keyed by [`RoleType`] carries every per-role rule: work
//! directory shape, startup command, session environment, theming, and
//! whether the clone needs a sync before the agent starts. Callers never
//! pattern-match on identity strings.

use crate::beacon::Beacon;
use crate::identity::{ParsedIdentity, RoleType};
use crate::rigs::RigsConfig;
use std::path::{Path, PathBuf};

/// Environment variable carrying the agent's role.
pub const ENV_ROLE: &str = "GT_ROLE";
/// Environment variable carrying the agent's rig (empty for town roles).
pub const ENV_RIG: &str = "GT_RIG";
/// Environment variable carrying the agent's name (empty for singletons).
pub const ENV_AGENT: &str = "GT_AGENT";
/// Environment variable carrying the town root.
pub const ENV_TOWN_ROOT: &str = "GT_TOWN_ROOT";

/// Visual theming for a role's sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTheme {
    /// Multiplexer status-line style, e.g. `bg=colour214,fg=colour16`.
    pub status_style: &'static str,
}

/// Static per-role rules.
#[derive(Debug, Clone, Copy)]
pub struct RoleSpec {
    pub role: RoleType,
    /// Whether the role's clone is synced before the agent starts.
    pub needs_pre_sync: bool,
    pub theme: SessionTheme,
}

impl RoleSpec {
    /// Look up the spec for a role.
    pub fn of(role: RoleType) -> &'static RoleSpec {
        match role {
            RoleType::Mayor => &MAYOR,
            RoleType::Deacon => &DEACON,
            RoleType::Witness => &WITNESS,
            RoleType::Refinery => &REFINERY,
            RoleType::Crew => &CREW,
            RoleType::Polecat => &POLECAT,
        }
    }
}

const MAYOR: RoleSpec = RoleSpec {
    role: RoleType::Mayor,
    needs_pre_sync: false,
    theme: SessionTheme { status_style: "bg=colour214,fg=colour16" },
};

const DEACON: RoleSpec = RoleSpec {
    role: RoleType::Deacon,
    needs_pre_sync: false,
    theme: SessionTheme { status_style: "bg=colour160,fg=colour255" },
};

const WITNESS: RoleSpec = RoleSpec {
    role: RoleType::Witness,
    needs_pre_sync: false,
    theme: SessionTheme { status_style: "bg=colour39,fg=colour16" },
};

const REFINERY: RoleSpec = RoleSpec {
    role: RoleType::Refinery,
    needs_pre_sync: true,
    theme: SessionTheme { status_style: "bg=colour208,fg=colour16" },
};

const CREW: RoleSpec = RoleSpec {
    role: RoleType::Crew,
    needs_pre_sync: false,
    theme: SessionTheme { status_style: "bg=colour34,fg=colour255" },
};

const POLECAT: RoleSpec = RoleSpec {
    role: RoleType::Polecat,
    needs_pre_sync: true,
    theme: SessionTheme { status_style: "bg=colour99,fg=colour255" },
};

impl ParsedIdentity {
    /// Work directory for this agent under the town root.
    ///
    /// Polecats work inside their worktree's rig clone
    /// (`<rig>/polecats/<name>/<rig>`); other rig roles get a directory
    /// named after the role under the rig root.
    pub fn work_dir(&self, town: &Path, rigs: &RigsConfig) -> PathBuf {
        match (self.role, &self.rig, &self.name) {
            (RoleType::Mayor, _, _) => town.join("mayor"),
            (RoleType::Deacon, _, _) => town.join("deacon"),
            (RoleType::Witness, Some(rig), _) => rigs.rig_path(town, rig).join("witness"),
            (RoleType::Refinery, Some(rig), _) => rigs.rig_path(town, rig).join("refinery"),
            (RoleType::Crew, Some(rig), Some(name)) => {
                rigs.rig_path(town, rig).join("crew").join(name)
            }
            (RoleType::Polecat, Some(rig), Some(name)) => {
                rigs.rig_path(town, rig).join("polecats").join(name).join(rig)
            }
            // validate() makes these unrepresentable; fall back to the town
            _ => town.to_path_buf(),
        }
    }

    /// Startup command line: the agent runtime plus an optional beacon.
    pub fn start_command(&self, runtime: &str, beacon: Option<&Beacon>) -> String {
        match beacon {
            Some(beacon) => format!("{} \"{}\"", runtime, escape_arg(&beacon.render())),
            None => runtime.to_string(),
        }
    }

    /// Session environment for this agent.
    pub fn session_env(&self, town: &Path) -> Vec<(String, String)> {
        vec![
            (ENV_ROLE.to_string(), self.role.as_str().to_string()),
            (ENV_RIG.to_string(), self.rig.clone().unwrap_or_default()),
            (ENV_AGENT.to_string(), self.name.clone().unwrap_or_default()),
            (ENV_TOWN_ROOT.to_string(), town.display().to_string()),
        ]
    }

    pub fn spec(&self) -> &'static RoleSpec {
        RoleSpec::of(self.role)
    }
}

/// Escape a string for embedding in a double-quoted shell argument.
fn escape_arg(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' | '\\' | '`' | '$' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "role_tests.rs"]
mod tests;
