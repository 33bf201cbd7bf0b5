// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gt-adapters: ports to the town's external collaborators.
//!
//! The daemon never shells out directly. Everything it needs from the
//! terminal multiplexer, the issue tracker, and the mail system goes
//! through the async-trait ports defined here. Real adapters wrap the
//! `tmux`, `bd`, and `gt` binaries (resolved once at startup); fake
//! adapters behind the `test-support` feature script answers and record
//! calls for tests.

pub mod mail;
pub mod mux;
pub mod proc;
pub mod tracker;

pub use mail::{GtMailCli, MailError, MailMessage, MailPort, MailPriority};
pub use mux::{MultiplexerPort, MuxError, SessionHealth, TmuxAdapter};
pub use proc::ProcessEntry;
pub use tracker::{
    BeadsCli, CompactStats, Convoy, GateOutcome, GateType, IssueTrackerPort, TrackerError,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use mail::{FakeMail, SentMail};
#[cfg(any(test, feature = "test-support"))]
pub use mux::{FakeMux, MuxCall};
#[cfg(any(test, feature = "test-support"))]
pub use tracker::FakeTracker;
