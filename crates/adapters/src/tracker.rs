// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue-tracker port.
//!
//! Narrow operations over the `bd` (beads) and `gt` CLIs. The binaries are
//! resolved once at daemon startup; every later call passes the explicit
//! path and the working directory it should run in.

use async_trait::async_trait;
use gt_core::AgentBead;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Well-known "nothing to do" output of the convoy completion sweep.
pub const CONVOY_IDLE_SENTINEL: &str = "no convoys ready";

/// Errors from issue-tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker binary not found: {0}")]
    BinaryNotFound(String),

    #[error("failed to run tracker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("tracker command failed: {0}")]
    CommandFailed(String),

    #[error("bad tracker output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Gate flavors evaluated during patrol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateType {
    Timer,
    Bead,
}

impl GateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateType::Timer => "timer",
            GateType::Bead => "bead",
        }
    }
}

/// Result of a gate evaluation. Exit code 1 is an accepted "nothing to do".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Triggered(String),
    NothingToDo,
}

/// Wisp compaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CompactStats {
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub promoted: u64,
    #[serde(default)]
    pub skipped: u64,
}

impl CompactStats {
    /// Whether anything actually happened.
    pub fn is_trivial(&self) -> bool {
        self.deleted == 0 && self.promoted == 0
    }
}

/// A work group with items ready but no live worker.
#[derive(Debug, Clone, Deserialize)]
pub struct Convoy {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ready_count: u32,
}

/// Operations the daemon needs from the issue tracker.
#[async_trait]
pub trait IssueTrackerPort: Clone + Send + Sync + 'static {
    /// Evaluate gates of one type in a directory.
    async fn gate_check(&self, dir: &Path, gate: GateType) -> Result<GateOutcome, TrackerError>;

    /// Run wisp TTL compaction in a directory.
    async fn compact(&self, dir: &Path) -> Result<CompactStats, TrackerError>;

    /// All agent beads registered in a directory's store.
    async fn list_agents(&self, dir: &Path) -> Result<Vec<AgentBead>, TrackerError>;

    /// Labels on a rig's registry bead.
    async fn rig_labels(&self, dir: &Path, rig: &str) -> Result<Vec<String>, TrackerError>;

    /// Work groups with ready items and no live worker.
    async fn stranded_convoys(&self, dir: &Path) -> Result<Vec<Convoy>, TrackerError>;

    /// Run the work-group completion sweep; returns its raw output.
    async fn check_convoys(&self, dir: &Path) -> Result<String, TrackerError>;

    /// Number of in-progress issues in a directory's store.
    async fn count_in_progress(&self, dir: &Path) -> Result<usize, TrackerError>;

    /// Spawn a replacement idle worker.
    async fn spawn_dog(&self, town: &Path, name: &str) -> Result<(), TrackerError>;

    /// Dispatch one stranded work group to available capacity.
    async fn dispatch_convoy(&self, dir: &Path, convoy_id: &str) -> Result<(), TrackerError>;

    /// Push a directory's beads database to its remote.
    async fn sync_remotes(&self, dir: &Path) -> Result<(), TrackerError>;
}

/// Real adapter over the `bd` and `gt` binaries.
#[derive(Clone)]
pub struct BeadsCli {
    bd: PathBuf,
    gt: PathBuf,
}

impl BeadsCli {
    /// Resolve both binaries once. Fails startup when either is missing.
    pub fn resolve() -> Result<Self, TrackerError> {
        let bd =
            which::which("bd").map_err(|_| TrackerError::BinaryNotFound("bd".to_string()))?;
        let gt =
            which::which("gt").map_err(|_| TrackerError::BinaryNotFound("gt".to_string()))?;
        Ok(Self { bd, gt })
    }

    pub fn with_binaries(bd: PathBuf, gt: PathBuf) -> Self {
        Self { bd, gt }
    }

    async fn run(
        &self,
        bin: &Path,
        dir: &Path,
        args: &[&str],
    ) -> Result<std::process::Output, TrackerError> {
        Ok(tokio::process::Command::new(bin).current_dir(dir).args(args).output().await?)
    }

    async fn run_ok(
        &self,
        bin: &Path,
        dir: &Path,
        args: &[&str],
    ) -> Result<String, TrackerError> {
        let output = self.run(bin, dir, args).await?;
        if !output.status.success() {
            return Err(TrackerError::CommandFailed(format!(
                "{} {}: {}",
                bin.display(),
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[derive(Deserialize)]
struct LabelsDoc {
    #[serde(default)]
    labels: Vec<String>,
}

#[async_trait]
impl IssueTrackerPort for BeadsCli {
    async fn gate_check(&self, dir: &Path, gate: GateType) -> Result<GateOutcome, TrackerError> {
        let gate_arg = format!("--type={}", gate.as_str());
        let output = self.run(&self.gt, dir, &["gate", "check", &gate_arg]).await?;
        match output.status.code() {
            Some(0) => {
                Ok(GateOutcome::Triggered(String::from_utf8_lossy(&output.stdout).to_string()))
            }
            Some(1) => Ok(GateOutcome::NothingToDo),
            _ => Err(TrackerError::CommandFailed(format!(
                "gate check --type={}: {}",
                gate.as_str(),
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    async fn compact(&self, dir: &Path) -> Result<CompactStats, TrackerError> {
        let out = self.run_ok(&self.gt, dir, &["compact", "--json"]).await?;
        Ok(serde_json::from_str(&out)?)
    }

    async fn list_agents(&self, dir: &Path) -> Result<Vec<AgentBead>, TrackerError> {
        let out = self.run_ok(&self.bd, dir, &["list", "--tag=agent", "--json"]).await?;
        if out.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&out)?)
    }

    async fn rig_labels(&self, dir: &Path, rig: &str) -> Result<Vec<String>, TrackerError> {
        let bead = format!("rig-{rig}");
        let out = self.run_ok(&self.bd, dir, &["show", &bead, "--json"]).await?;
        let doc: LabelsDoc = serde_json::from_str(&out)?;
        Ok(doc.labels)
    }

    async fn stranded_convoys(&self, dir: &Path) -> Result<Vec<Convoy>, TrackerError> {
        let out = self.run_ok(&self.bd, dir, &["convoy", "list", "--stranded", "--json"]).await?;
        if out.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&out)?)
    }

    async fn check_convoys(&self, dir: &Path) -> Result<String, TrackerError> {
        self.run_ok(&self.bd, dir, &["convoy", "check"]).await
    }

    async fn count_in_progress(&self, dir: &Path) -> Result<usize, TrackerError> {
        let out = self.run_ok(&self.bd, dir, &["list", "--status=in_progress", "--json"]).await?;
        if out.trim().is_empty() {
            return Ok(0);
        }
        let issues: Vec<serde_json::Value> = serde_json::from_str(&out)?;
        Ok(issues.len())
    }

    async fn spawn_dog(&self, town: &Path, name: &str) -> Result<(), TrackerError> {
        self.run_ok(&self.gt, town, &["dog", "spawn", name]).await?;
        Ok(())
    }

    async fn dispatch_convoy(&self, dir: &Path, convoy_id: &str) -> Result<(), TrackerError> {
        self.run_ok(&self.bd, dir, &["convoy", "dispatch", convoy_id]).await?;
        Ok(())
    }

    async fn sync_remotes(&self, dir: &Path) -> Result<(), TrackerError> {
        self.run_ok(&self.bd, dir, &["sync"]).await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeTrackerState {
        agents: HashMap<PathBuf, Vec<AgentBead>>,
        rig_labels: HashMap<String, Vec<String>>,
        gate_outcomes: HashMap<(PathBuf, &'static str), GateOutcome>,
        gate_calls: Vec<(PathBuf, &'static str)>,
        compact_stats: CompactStats,
        compacted: Vec<PathBuf>,
        stranded: Vec<Convoy>,
        convoy_output: Option<String>,
        convoy_checks: usize,
        in_progress: HashMap<PathBuf, usize>,
        spawned_dogs: Vec<String>,
        dispatched: Vec<String>,
        synced: Vec<PathBuf>,
    }

    /// Fake issue tracker: scriptable answers, recorded calls.
    #[derive(Clone, Default)]
    pub struct FakeTracker {
        inner: Arc<Mutex<FakeTrackerState>>,
    }

    impl FakeTracker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_agents(&self, dir: &Path, agents: Vec<AgentBead>) {
            self.inner.lock().agents.insert(dir.to_path_buf(), agents);
        }

        pub fn set_rig_labels(&self, rig: &str, labels: Vec<String>) {
            self.inner.lock().rig_labels.insert(rig.to_string(), labels);
        }

        pub fn set_gate_outcome(&self, dir: &Path, gate: GateType, outcome: GateOutcome) {
            self.inner.lock().gate_outcomes.insert((dir.to_path_buf(), gate.as_str()), outcome);
        }

        pub fn set_stranded(&self, convoys: Vec<Convoy>) {
            self.inner.lock().stranded = convoys;
        }

        pub fn set_convoy_output(&self, output: &str) {
            self.inner.lock().convoy_output = Some(output.to_string());
        }

        pub fn set_in_progress(&self, dir: &Path, count: usize) {
            self.inner.lock().in_progress.insert(dir.to_path_buf(), count);
        }

        pub fn gate_calls(&self) -> Vec<(PathBuf, &'static str)> {
            self.inner.lock().gate_calls.clone()
        }

        pub fn compacted_dirs(&self) -> Vec<PathBuf> {
            self.inner.lock().compacted.clone()
        }

        pub fn convoy_check_count(&self) -> usize {
            self.inner.lock().convoy_checks
        }

        pub fn spawned_dogs(&self) -> Vec<String> {
            self.inner.lock().spawned_dogs.clone()
        }

        pub fn dispatched(&self) -> Vec<String> {
            self.inner.lock().dispatched.clone()
        }

        pub fn synced_dirs(&self) -> Vec<PathBuf> {
            self.inner.lock().synced.clone()
        }
    }

    #[async_trait]
    impl IssueTrackerPort for FakeTracker {
        async fn gate_check(
            &self,
            dir: &Path,
            gate: GateType,
        ) -> Result<GateOutcome, TrackerError> {
            let mut state = self.inner.lock();
            state.gate_calls.push((dir.to_path_buf(), gate.as_str()));
            Ok(state
                .gate_outcomes
                .get(&(dir.to_path_buf(), gate.as_str()))
                .cloned()
                .unwrap_or(GateOutcome::NothingToDo))
        }

        async fn compact(&self, dir: &Path) -> Result<CompactStats, TrackerError> {
            let mut state = self.inner.lock();
            state.compacted.push(dir.to_path_buf());
            Ok(state.compact_stats)
        }

        async fn list_agents(&self, dir: &Path) -> Result<Vec<AgentBead>, TrackerError> {
            Ok(self.inner.lock().agents.get(dir).cloned().unwrap_or_default())
        }

        async fn rig_labels(&self, _dir: &Path, rig: &str) -> Result<Vec<String>, TrackerError> {
            Ok(self.inner.lock().rig_labels.get(rig).cloned().unwrap_or_default())
        }

        async fn stranded_convoys(&self, _dir: &Path) -> Result<Vec<Convoy>, TrackerError> {
            Ok(self.inner.lock().stranded.clone())
        }

        async fn check_convoys(&self, _dir: &Path) -> Result<String, TrackerError> {
            let mut state = self.inner.lock();
            state.convoy_checks += 1;
            Ok(state.convoy_output.clone().unwrap_or_else(|| CONVOY_IDLE_SENTINEL.to_string()))
        }

        async fn count_in_progress(&self, dir: &Path) -> Result<usize, TrackerError> {
            Ok(self.inner.lock().in_progress.get(dir).copied().unwrap_or(0))
        }

        async fn spawn_dog(&self, _town: &Path, name: &str) -> Result<(), TrackerError> {
            self.inner.lock().spawned_dogs.push(name.to_string());
            Ok(())
        }

        async fn dispatch_convoy(&self, _dir: &Path, convoy_id: &str) -> Result<(), TrackerError> {
            self.inner.lock().dispatched.push(convoy_id.to_string());
            Ok(())
        }

        async fn sync_remotes(&self, dir: &Path) -> Result<(), TrackerError> {
            self.inner.lock().synced.push(dir.to_path_buf());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeTracker;

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
