// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orphan process reaping (step 1).
//!
//! Agent runtime processes that lost their terminal (TTY `?`) or outlived
//! every multiplexer session are reaped: terminate, grace, then kill.
//! Runs before any new spawn so a fresh session never inherits a fight
//! over the same work.

use crate::daemon::Daemon;
use gt_adapters::proc::{self, ProcessEntry};
use gt_adapters::{IssueTrackerPort, MailPort, MultiplexerPort};
use gt_core::Clock;
use std::time::Duration;
use tracing::{info, warn};

/// A runtime process younger than this is still starting up, not orphaned.
const MIN_ORPHAN_AGE: Duration = Duration::from_secs(10 * 60);

/// Program basename of the first token of the runtime command line.
fn runtime_signature(runtime: &str) -> String {
    runtime
        .split_whitespace()
        .next()
        .map(|bin| bin.rsplit('/').next().unwrap_or(bin).to_string())
        .unwrap_or_default()
}

fn is_runtime_process(entry: &ProcessEntry, signature: &str) -> bool {
    !signature.is_empty()
        && entry
            .command
            .split_whitespace()
            .next()
            .map(|bin| bin.rsplit('/').next().unwrap_or(bin) == signature)
            .unwrap_or(false)
}

/// Orphan test for one process-table row.
fn is_orphan(entry: &ProcessEntry, signature: &str, any_sessions: bool) -> bool {
    if !is_runtime_process(entry, signature) {
        return false;
    }
    if entry.elapsed < MIN_ORPHAN_AGE {
        return false;
    }
    // Lost its terminal, or no session exists that could own it.
    entry.detached() || !any_sessions
}

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    /// Step 1: terminate then kill orphaned agent runtime processes.
    pub(crate) async fn reap_orphan_processes(&self) {
        let signature = runtime_signature(&self.runtime);
        if signature.is_empty() {
            return;
        }

        let table = match proc::list_processes().await {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "process table unavailable");
                return;
            }
        };
        let any_sessions = match self.mux.list_sessions().await {
            Ok(sessions) => !sessions.is_empty(),
            Err(e) => {
                warn!(error = %e, "session listing failed");
                true // assume sessions exist rather than over-kill
            }
        };

        let orphans: Vec<&ProcessEntry> =
            table.iter().filter(|e| is_orphan(e, &signature, any_sessions)).collect();
        if orphans.is_empty() {
            return;
        }

        for orphan in orphans {
            info!(
                pid = orphan.pid,
                tty = %orphan.tty,
                elapsed_secs = orphan.elapsed.as_secs(),
                "reaping orphaned runtime process"
            );
            proc::terminate_tree(orphan.pid, Duration::from_secs(2)).await;
        }
    }

    /// Alias used by the heartbeat's trailing cleanup position.
    pub(crate) async fn clean_orphan_processes(&self) {
        self.reap_orphan_processes().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(command: &str, tty: &str, elapsed_secs: u64) -> ProcessEntry {
        ProcessEntry {
            pid: 1234,
            ppid: 1,
            tty: tty.to_string(),
            elapsed: Duration::from_secs(elapsed_secs),
            command: command.to_string(),
        }
    }

    #[yare::parameterized(
        bare       = { "claude", "claude" },
        with_args  = { "claude --continue", "claude" },
        full_path  = { "/usr/local/bin/claude \"beacon\"", "claude" },
        empty      = { "", "" },
    )]
    fn runtime_signatures(runtime: &str, expected: &str) {
        assert_eq!(runtime_signature(runtime), expected);
    }

    #[test]
    fn detached_old_runtime_process_is_an_orphan() {
        let e = entry("claude --continue", "?", 3600);
        assert!(is_orphan(&e, "claude", true));
    }

    #[test]
    fn attached_process_is_kept_while_sessions_exist() {
        let e = entry("claude", "pts/2", 3600);
        assert!(!is_orphan(&e, "claude", true));
        // ... but with no sessions left, nothing can own it
        assert!(is_orphan(&e, "claude", false));
    }

    #[test]
    fn young_processes_are_never_orphans() {
        let e = entry("claude", "?", 30);
        assert!(!is_orphan(&e, "claude", true));
    }

    #[test]
    fn other_programs_are_ignored() {
        let e = entry("vim claude.md", "?", 3600);
        assert!(!is_orphan(&e, "claude", true));
        let e = entry("claudette", "?", 3600);
        assert!(!is_orphan(&e, "claude", true));
    }
}
