// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared spec fixtures: a temp town wired to fake ports.

pub use gt_adapters::{
    FakeMail, FakeMux, FakeTracker, IssueTrackerPort, MailPort, MultiplexerPort, SessionHealth,
};
pub use gt_core::test_support::AgentBeadBuilder;
pub use gt_core::{Clock, FakeClock, ParsedIdentity, PatrolConfig, RigsConfig, RoleType};
pub use gt_daemon::{Daemon, DaemonDeps, TownPaths};
pub use std::time::Duration;

pub type SpecDaemon = Daemon<FakeMux, FakeTracker, FakeMail, FakeClock>;

pub struct SpecTown {
    // Held for its Drop; everything else is cloned into the daemon.
    #[allow(dead_code)]
    pub dir: tempfile::TempDir,
    pub paths: TownPaths,
    pub daemon: SpecDaemon,
    pub mux: FakeMux,
    pub tracker: FakeTracker,
    pub mail: FakeMail,
    pub clock: FakeClock,
}

/// A town with one rig, `gastown`, and default patrol config.
pub fn gastown() -> SpecTown {
    town(r#"{"rigs":{"gastown":{}}}"#, "")
}

pub fn town(rigs_json: &str, config_json: &str) -> SpecTown {
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
        // A runtime name nothing on the host machine matches, so the
        // orphan reaper never touches real processes during tests.
        "gt-spec-runtime".to_string(),
    )
    .unwrap();

    SpecTown { dir, paths, daemon, mux, tracker, mail, clock }
}

impl SpecTown {
    pub fn rig_path(&self) -> std::path::PathBuf {
        self.paths.root.join("gastown")
    }

    /// Create a polecat worktree: `<rig>/polecats/<name>/<rig>`.
    pub fn polecat_worktree(&self, name: &str) {
        let dir = self.rig_path().join("polecats").join(name).join("gastown");
        std::fs::create_dir_all(dir).unwrap();
    }

    /// Escalation mail delivered to the coordinator, filtered by a subject
    /// fragment.
    pub fn escalations_containing(&self, fragment: &str) -> Vec<gt_adapters::SentMail> {
        self.mail
            .sent_to("mayor")
            .into_iter()
            .filter(|m| m.subject.starts_with("ESCALATION:") && m.subject.contains(fragment))
            .collect()
    }
}
