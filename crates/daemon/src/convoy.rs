// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Convoy poller.
//!
//! A background task that runs the issue tracker's work-group completion
//! sweep in the town root: once at start, then every 30 seconds until
//! cancelled.

use gt_adapters::tracker::{IssueTrackerPort, CONVOY_IDLE_SENTINEL};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sweep cadence.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn the poller; it exits when the token is cancelled.
pub fn spawn<T: IssueTrackerPort>(
    tracker: T,
    town: PathBuf,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(tracker, town, cancel))
}

async fn run<T: IssueTrackerPort>(tracker: T, town: PathBuf, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("convoy poller stopped");
                return;
            }
            _ = interval.tick() => {
                sweep(&tracker, &town).await;
            }
        }
    }
}

async fn sweep<T: IssueTrackerPort>(tracker: &T, town: &std::path::Path) {
    match tracker.check_convoys(town).await {
        Ok(output) => {
            let output = output.trim();
            if !output.is_empty() && output != CONVOY_IDLE_SENTINEL {
                info!(%output, "convoy sweep");
            }
        }
        Err(e) => warn!(error = %e, "convoy sweep failed"),
    }
}
