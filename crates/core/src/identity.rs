// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identities.
//!
//! Two textual forms coexist and must round-trip: *dashed*
//! (`gastown-witness`, `gastown-crew-joe`) used in session names, and
//! *slashed* (`gastown/witness`, `gastown/crew/joe`) used in mail
//! addresses. Town-level roles (`mayor`, `deacon`) have no rig segment.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of agent roles in a town.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    /// Town coordinator
    Mayor,
    /// Town watchdog
    Deacon,
    /// Per-rig observer
    Witness,
    /// Per-rig merge processor
    Refinery,
    /// Named long-lived rig worker
    Crew,
    /// Ephemeral task worker bound to a single hook bead
    Polecat,
}

impl RoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Mayor => "mayor",
            RoleType::Deacon => "deacon",
            RoleType::Witness => "witness",
            RoleType::Refinery => "refinery",
            RoleType::Crew => "crew",
            RoleType::Polecat => "polecat",
        }
    }

    pub fn parse(s: &str) -> Option<RoleType> {
        match s {
            "mayor" => Some(RoleType::Mayor),
            "deacon" => Some(RoleType::Deacon),
            "witness" => Some(RoleType::Witness),
            "refinery" => Some(RoleType::Refinery),
            "crew" => Some(RoleType::Crew),
            "polecat" => Some(RoleType::Polecat),
            _ => None,
        }
    }

    /// Town-level roles live outside any rig.
    pub fn is_town_level(&self) -> bool {
        matches!(self, RoleType::Mayor | RoleType::Deacon)
    }

    /// Named roles require an agent name; singletons forbid one.
    pub fn is_named(&self) -> bool {
        matches!(self, RoleType::Crew | RoleType::Polecat)
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from identity parsing and construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("empty identity")]
    Empty,

    #[error("no role found in identity '{0}'")]
    NoRole(String),

    #[error("role '{role}' requires an agent name in '{identity}'")]
    MissingName { role: RoleType, identity: String },

    #[error("role '{role}' takes no agent name in '{identity}'")]
    UnexpectedName { role: RoleType, identity: String },

    #[error("town-level role '{role}' takes no rig in '{identity}'")]
    UnexpectedRig { role: RoleType, identity: String },

    #[error("rig-scoped role '{role}' requires a rig in '{identity}'")]
    MissingRig { role: RoleType, identity: String },
}

/// A fully parsed agent identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedIdentity {
    pub role: RoleType,
    /// Rig the agent belongs to; `None` for town-level roles.
    pub rig: Option<String>,
    /// Agent name; `None` for singleton roles.
    pub name: Option<String>,
}

impl ParsedIdentity {
    /// Construct and validate an identity from parts.
    pub fn new(
        role: RoleType,
        rig: Option<String>,
        name: Option<String>,
    ) -> Result<Self, IdentityError> {
        let identity = Self { role, rig, name };
        identity.validate()?;
        Ok(identity)
    }

    /// Town-level identity (mayor or deacon).
    pub fn town(role: RoleType) -> Result<Self, IdentityError> {
        Self::new(role, None, None)
    }

    /// Rig-scoped singleton identity (witness or refinery).
    pub fn rig_singleton(role: RoleType, rig: &str) -> Result<Self, IdentityError> {
        Self::new(role, Some(rig.to_string()), None)
    }

    /// Named rig-scoped identity (crew or polecat).
    pub fn named(role: RoleType, rig: &str, name: &str) -> Result<Self, IdentityError> {
        Self::new(role, Some(rig.to_string()), Some(name.to_string()))
    }

    fn validate(&self) -> Result<(), IdentityError> {
        let shown = self.slashed();
        if self.role.is_town_level() {
            if self.rig.is_some() {
                return Err(IdentityError::UnexpectedRig { role: self.role, identity: shown });
            }
        } else if self.rig.is_none() {
            return Err(IdentityError::MissingRig { role: self.role, identity: shown });
        }
        if self.role.is_named() {
            if self.name.as_deref().unwrap_or("").is_empty() {
                return Err(IdentityError::MissingName { role: self.role, identity: shown });
            }
        } else if self.name.is_some() {
            return Err(IdentityError::UnexpectedName { role: self.role, identity: shown });
        }
        Ok(())
    }

    /// Parse the dashed form: `<rig>-<role>[-<name>]`, or a bare town role.
    ///
    /// Rig names may themselves contain dashes, so the role keyword is
    /// located by scanning the dash-separated tokens; everything before it
    /// is the rig, everything after it the agent name.
    pub fn parse_dashed(s: &str) -> Result<Self, IdentityError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdentityError::Empty);
        }
        if let Some(role) = RoleType::parse(s) {
            return Self::new(role, None, None);
        }

        let tokens: Vec<&str> = s.split('-').collect();
        for (i, token) in tokens.iter().enumerate() {
            let Some(role) = RoleType::parse(token) else { continue };
            if role.is_town_level() {
                continue; // "mayor"/"deacon" inside a longer name is not a role
            }
            let rig = tokens[..i].join("-");
            let name = tokens[i + 1..].join("-");
            if rig.is_empty() {
                return Err(IdentityError::MissingRig { role, identity: s.to_string() });
            }
            let name = if name.is_empty() { None } else { Some(name) };
            return Self::new(role, Some(rig), name);
        }
        Err(IdentityError::NoRole(s.to_string()))
    }

    /// Parse the slashed form: `<rig>/<role>[/<name>]`, or a bare town role.
    pub fn parse_slashed(s: &str) -> Result<Self, IdentityError> {
        let s = s.trim().trim_matches('/');
        if s.is_empty() {
            return Err(IdentityError::Empty);
        }
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [role] => {
                let role = RoleType::parse(role)
                    .ok_or_else(|| IdentityError::NoRole(s.to_string()))?;
                Self::new(role, None, None)
            }
            [rig, role] => {
                let role = RoleType::parse(role)
                    .ok_or_else(|| IdentityError::NoRole(s.to_string()))?;
                Self::new(role, Some(rig.to_string()), None)
            }
            [rig, role, name] => {
                let role = RoleType::parse(role)
                    .ok_or_else(|| IdentityError::NoRole(s.to_string()))?;
                Self::new(role, Some(rig.to_string()), Some(name.to_string()))
            }
            _ => Err(IdentityError::NoRole(s.to_string())),
        }
    }

    /// Dashed form: `<rig>-<role>[-<name>]` (town roles are bare).
    pub fn dashed(&self) -> String {
        let mut out = String::new();
        if let Some(rig) = &self.rig {
            out.push_str(rig);
            out.push('-');
        }
        out.push_str(self.role.as_str());
        if let Some(name) = &self.name {
            out.push('-');
            out.push_str(name);
        }
        out
    }

    /// Slashed form: `<rig>/<role>[/<name>]` (town roles are bare).
    pub fn slashed(&self) -> String {
        let mut out = String::new();
        if let Some(rig) = &self.rig {
            out.push_str(rig);
            out.push('/');
        }
        out.push_str(self.role.as_str());
        if let Some(name) = &self.name {
            out.push('/');
            out.push_str(name);
        }
        out
    }

    /// Mail address for this agent: the slashed form.
    pub fn mail_address(&self) -> String {
        self.slashed()
    }

    /// Agent bead id: `<prefix>-<dashed identity>`.
    ///
    /// Unlike session names, bead ids keep the role segment for every role
    /// (`gt-gastown-polecat-slit`).
    pub fn bead_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.dashed())
    }

    /// Multiplexer session name for this agent.
    ///
    /// Polecat sessions drop the role segment (`gt-gastown-slit`); every
    /// other role uses the dashed identity under the rig prefix.
    pub fn session_name(&self, prefix: &str) -> String {
        match (&self.role, &self.rig, &self.name) {
            (RoleType::Polecat, Some(rig), Some(name)) => {
                format!("{prefix}-{rig}-{name}")
            }
            _ => format!("{}-{}", prefix, self.dashed()),
        }
    }
}

impl fmt::Display for ParsedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slashed())
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
