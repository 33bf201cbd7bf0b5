// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gt-core: shared types for the Gas Town daemon
//!
//! Identities and the role table, the clock abstraction, patrol and rig
//! configuration models, agent bead records, and duration parsing. No I/O
//! happens here; everything is pure data consumed by the daemon and the
//! adapter crates.

pub mod bead;
pub mod beacon;
pub mod clock;
pub mod config;
pub mod duration;
pub mod identity;
pub mod rigs;
pub mod role;
pub mod time_fmt;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use bead::{agent_state, AgentBead};
pub use beacon::Beacon;
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{DoltServerConfig, HeartbeatConfig, PatrolConfig, Patrols, RemotesConfig};
pub use duration::parse_duration;
pub use identity::{IdentityError, ParsedIdentity, RoleType};
pub use rigs::{RigEntry, RigsConfig};
pub use role::{RoleSpec, SessionTheme};
pub use time_fmt::format_elapsed;
