// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stale polecat branch pruning.
//!
//! Polecats work on `polecat/<name>` branches across the rig's clones.
//! Once a polecat is gone (no worktree left), its fully-merged local
//! branches are deleted. Unmerged branches are left alone; losing work is
//! worse than clutter.

use crate::daemon::Daemon;
use gt_adapters::{IssueTrackerPort, MailPort, MultiplexerPort};
use gt_core::Clock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BRANCH_PREFIX: &str = "polecat/";

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    /// Prune merged `polecat/*` branches with no live polecat, across every
    /// clone of every rig. Best-effort.
    pub(crate) async fn prune_polecat_branches(&self) {
        for rig in self.rig_names() {
            let rig_path = self.rig_path(&rig);
            let live = live_polecats(&rig_path);
            for clone in rig_clones(&rig_path) {
                prune_clone(&clone, &live).await;
            }
        }
    }
}

/// Polecat names that still have a worktree.
fn live_polecats(rig_path: &Path) -> HashSet<String> {
    let Ok(entries) = std::fs::read_dir(rig_path.join("polecats")) else {
        return HashSet::new();
    };
    entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect()
}

/// The rig root and the role clones beneath it.
fn rig_clones(rig_path: &Path) -> Vec<PathBuf> {
    [rig_path.to_path_buf(), rig_path.join("witness"), rig_path.join("refinery")]
        .into_iter()
        .filter(|p| p.join(".git").exists())
        .collect()
}

async fn prune_clone(clone: &Path, live: &HashSet<String>) {
    let clone_arg = clone.display().to_string();
    let output = tokio::process::Command::new("git")
        .args([
            "-C",
            &clone_arg,
            "for-each-ref",
            "--format=%(refname:short)",
            &format!("refs/heads/{BRANCH_PREFIX}"),
        ])
        .output()
        .await;
    let Ok(output) = output else { return };
    if !output.status.success() {
        return;
    }

    for branch in String::from_utf8_lossy(&output.stdout).lines() {
        let branch = branch.trim();
        let Some(name) = branch.strip_prefix(BRANCH_PREFIX) else { continue };
        if live.contains(name) {
            continue;
        }
        // -d, not -D: only fully-merged branches may go.
        let result = tokio::process::Command::new("git")
            .args(["-C", &clone_arg, "branch", "-d", branch])
            .output()
            .await;
        match result {
            Ok(out) if out.status.success() => {
                info!(clone = %clone.display(), branch, "pruned stale polecat branch");
            }
            Ok(out) => {
                debug!(
                    clone = %clone.display(),
                    branch,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "branch not pruned"
                );
            }
            Err(e) => debug!(clone = %clone.display(), branch, error = %e, "git spawn failed"),
        }
    }
}
