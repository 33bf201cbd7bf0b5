// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon composition root.
//!
//! [`Daemon`] is generic over the three ports and the clock so every
//! subsystem can be driven in tests with fakes and controlled time. The
//! subsystem logic lives in sibling modules as `impl` blocks on this type.

use crate::deck::MassDeathDeck;
use crate::dolt::DoltManager;
use crate::escalation::Escalator;
use crate::feed::FeedCurator;
use crate::health::HealthFailureTracker;
use crate::lifecycle::TownPaths;
use crate::notifier::DedupTable;
use crate::storage::restart::RestartTracker;
use crate::storage::state::StateStore;
use gt_adapters::{IssueTrackerPort, MailPort, MultiplexerPort};
use gt_core::rigs::DEFAULT_PREFIX;
use gt_core::{Clock, ParsedIdentity, PatrolConfig, RigsConfig};
use std::path::{Path, PathBuf};

/// The daemon's ports.
pub struct DaemonDeps<M, T, P> {
    pub mux: M,
    pub tracker: T,
    pub mail: P,
}

/// One town's supervisor.
pub struct Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    pub(crate) paths: TownPaths,
    pub(crate) config: PatrolConfig,
    pub(crate) rigs: RigsConfig,
    pub(crate) mux: M,
    pub(crate) tracker: T,
    pub(crate) mail: P,
    pub(crate) clock: C,
    /// Agent runtime command started inside every session.
    pub(crate) runtime: String,
    pub(crate) restarts: RestartTracker<C>,
    pub(crate) escalator: Escalator<P, C>,
    pub(crate) health: HealthFailureTracker,
    pub(crate) deck: MassDeathDeck<C>,
    pub(crate) feed: FeedCurator,
    pub(crate) state: StateStore,
    pub(crate) dolt: Option<DoltManager<C>>,
}

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    pub fn new(
        paths: TownPaths,
        config: PatrolConfig,
        rigs: RigsConfig,
        deps: DaemonDeps<M, T, P>,
        clock: C,
        runtime: String,
    ) -> std::io::Result<Self> {
        let restarts = RestartTracker::load(paths.restart_state_path(), clock.clone())?;
        let dedup = DedupTable::new(paths.escalations_dir(), clock.clone());
        let escalator = Escalator::new(deps.mail.clone(), dedup);
        let feed = FeedCurator::new(paths.feed_path());
        let state = StateStore::new(paths.state_path());
        Ok(Self {
            deck: MassDeathDeck::new(clock.clone()),
            health: HealthFailureTracker::default(),
            mux: deps.mux,
            tracker: deps.tracker,
            mail: deps.mail,
            clock,
            runtime,
            restarts,
            escalator,
            feed,
            state,
            dolt: None,
            paths,
            config,
            rigs,
        })
    }

    /// Attach a managed dolt server (built by the run loop when enabled).
    pub fn with_dolt(mut self, dolt: DoltManager<C>) -> Self {
        self.dolt = Some(dolt);
        self
    }

    pub fn dolt_manager(&self) -> Option<&DoltManager<C>> {
        self.dolt.as_ref()
    }

    pub fn town(&self) -> &Path {
        &self.paths.root
    }

    pub fn paths(&self) -> &TownPaths {
        &self.paths
    }

    pub fn config(&self) -> &PatrolConfig {
        &self.config
    }

    pub fn restarts(&self) -> &RestartTracker<C> {
        &self.restarts
    }

    pub fn feed(&self) -> &FeedCurator {
        &self.feed
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    /// Session/bead prefix for an identity's rig (town roles use the default).
    pub(crate) fn prefix_for(&self, id: &ParsedIdentity) -> &str {
        match &id.rig {
            Some(rig) => self.rigs.prefix(rig),
            None => DEFAULT_PREFIX,
        }
    }

    pub(crate) fn session_name_for(&self, id: &ParsedIdentity) -> String {
        id.session_name(self.prefix_for(id))
    }

    pub(crate) fn rig_path(&self, rig: &str) -> PathBuf {
        self.rigs.rig_path(&self.paths.root, rig)
    }

    /// Rig names in stable order, cloned so callers can await while iterating.
    pub(crate) fn rig_names(&self) -> Vec<String> {
        self.rigs.names().map(String::from).collect()
    }
}
