// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon run loop.
//!
//! Sequences initialization, runs the first heartbeat synchronously, then
//! selects over the heartbeat ticker, the DB health ticker, the remotes
//! push ticker, Unix signals, and root-context cancellation. Graceful
//! shutdown stops owned subsystems and marks the state file stopped.

use crate::daemon::Daemon;
use crate::lifecycle::LifecycleError;
use gt_adapters::{IssueTrackerPort, MailPort, MultiplexerPort};
use gt_core::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Feed trim cadence.
const FEED_TRIM_INTERVAL: Duration = Duration::from_secs(3600);

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    /// Run until a signal or cancellation. The singleton lock must already
    /// be held by the caller (see `lifecycle::startup`).
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), LifecycleError> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        // The lifecycle signal: run the lifecycle processor immediately.
        let mut sigusr1 = signal(SignalKind::user_defined1())?;

        // Background tasks: convoy sweep and feed curation.
        let convoy_handle = crate::convoy::spawn(
            self.tracker.clone(),
            self.paths.root.clone(),
            cancel.child_token(),
        );
        let feed_handle = spawn_feed_trimmer(Arc::clone(&self), cancel.child_token());

        // First heartbeat runs synchronously so a freshly started town
        // converges before any ticker fires.
        if self.config.heartbeat.enabled {
            self.heartbeat().await;
        }

        let heartbeat_period = self.config.heartbeat.interval();
        let mut heartbeat_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + heartbeat_period,
            heartbeat_period,
        );
        heartbeat_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let db_period = self.config.patrols.dolt_server.health_check_interval();
        let mut db_tick =
            tokio::time::interval_at(tokio::time::Instant::now() + db_period, db_period);
        db_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let remotes_period = self.config.patrols.dolt_remotes.interval();
        let mut remotes_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + remotes_period,
            remotes_period,
        );
        remotes_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            heartbeat_secs = heartbeat_period.as_secs(),
            db_health_secs = db_period.as_secs(),
            "daemon running"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("root context cancelled");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received");
                    break;
                }
                _ = sigint.recv() => {
                    info!("SIGINT received");
                    break;
                }
                _ = sigusr1.recv() => {
                    info!("lifecycle signal received, processing requests");
                    self.process_lifecycle_requests().await;
                }
                _ = heartbeat_tick.tick() => {
                    if self.config.heartbeat.enabled {
                        self.heartbeat().await;
                    }
                }
                _ = db_tick.tick() => {
                    self.ensure_dolt().await;
                }
                _ = remotes_tick.tick() => {
                    self.push_remotes().await;
                }
            }
        }

        // Graceful shutdown: stop watchers, then owned subprocesses.
        cancel.cancel();
        let _ = convoy_handle.await;
        let _ = feed_handle.await;

        if let Some(dolt) = &self.dolt {
            let dolt_config = &self.config.patrols.dolt_server;
            if dolt_config.enabled && !dolt_config.external {
                dolt.stop().await;
            }
        }

        self.save_stopped_state();
        info!("daemon stopped");
        Ok(())
    }

    /// Push every rig's beads database to its remote.
    pub async fn push_remotes(&self) {
        if !self.config.patrols.dolt_remotes.enabled {
            return;
        }
        for rig in self.rig_names() {
            let rig_path = self.rig_path(&rig);
            match self.tracker.sync_remotes(&rig_path).await {
                Ok(()) => info!(rig = %rig, "remotes pushed"),
                Err(e) => warn!(rig = %rig, error = %e, "remotes push failed"),
            }
        }
    }
}

fn spawn_feed_trimmer<M, T, P, C>(
    daemon: Arc<Daemon<M, T, P, C>>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(FEED_TRIM_INTERVAL);
        tick.tick().await; // skip the immediate first tick
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => daemon.feed().trim(),
            }
        }
    })
}
