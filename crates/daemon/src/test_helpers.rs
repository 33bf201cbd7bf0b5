// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for daemon tests: a temp town wired to fake ports and
//! a controllable clock.

use crate::daemon::{Daemon, DaemonDeps};
use crate::lifecycle::TownPaths;
use gt_adapters::{FakeMail, FakeMux, FakeTracker};
use gt_core::{Clock, FakeClock, PatrolConfig, RigsConfig};

pub(crate) type TestDaemon = Daemon<FakeMux, FakeTracker, FakeMail, FakeClock>;

pub(crate) struct TestTown {
    // Held for its Drop; the daemon owns clones of everything else.
    #[allow(dead_code)]
    pub dir: tempfile::TempDir,
    pub paths: TownPaths,
    pub daemon: TestDaemon,
    pub mux: FakeMux,
    pub tracker: FakeTracker,
    pub mail: FakeMail,
    pub clock: FakeClock,
}

/// A town with one rig, `gastown`, and default patrol config.
pub(crate) fn gastown() -> TestTown {
    town(r#"{"rigs":{"gastown":{}}}"#, "")
}

pub(crate) fn town(rigs_json: &str, config_json: &str) -> TestTown {
    let dir = tempfile::tempdir().unwrap();
    let paths = TownPaths::new(dir.path().to_path_buf());
    std::fs::create_dir_all(paths.daemon_dir()).unwrap();

    let rigs = RigsConfig::from_json(rigs_json).unwrap();
    let config = PatrolConfig::from_json(config_json).unwrap();
    let mux = FakeMux::new();
    let tracker = FakeTracker::new();
    let mail = FakeMail::new();
    let clock = FakeClock::new();
    mail.set_now(clock.utc_now());

    let daemon = Daemon::new(
        paths.clone(),
        config,
        rigs,
        DaemonDeps { mux: mux.clone(), tracker: tracker.clone(), mail: mail.clone() },
        clock.clone(),
        // A runtime name no real process matches, so the orphan reaper
        // never touches the host while tests run.
        "gt-test-runtime".to_string(),
    )
    .unwrap();

    TestTown { dir, paths, daemon, mux, tracker, mail, clock }
}

impl TestTown {
    /// Create the polecat worktree directory S-style:
    /// `<rig>/polecats/<name>/<rig>`.
    pub(crate) fn polecat_worktree(&self, rig: &str, name: &str) {
        let dir = self.paths.root.join(rig).join("polecats").join(name).join(rig);
        std::fs::create_dir_all(dir).unwrap();
    }
}
