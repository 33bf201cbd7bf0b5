// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One crashed polecat recovers in a single tick, quietly.

use crate::specs::prelude::*;

#[tokio::test]
async fn crashed_polecat_recovers_in_one_tick() {
    let town = gastown();
    town.polecat_worktree("slit");
    town.tracker.set_agents(
        &town.rig_path(),
        vec![AgentBeadBuilder::polecat("gastown", "slit")
            .hook("gt-abc")
            .updated_at(town.clock.utc_now())
            .build()],
    );

    let report = town.daemon.heartbeat().await;
    assert!(!report.skipped);

    // The polecat's session exists and its agent was started
    assert!(town.mux.has("gt-gastown-slit"));
    assert!(!town.mux.sent_keys("gt-gastown-slit").is_empty());

    // Exactly one restart recorded for the polecat
    let record = town.daemon.restarts().record("gastown-polecat-slit").unwrap();
    assert_eq!(record.restart_count, 1);

    // No escalation, no GUPP or orphaned-work mail
    assert!(town.mail.sent_to("mayor").is_empty());
    assert!(town.mail.sent_to("gastown/witness").is_empty());
}

#[tokio::test]
async fn recovered_polecat_is_stable_on_the_next_tick() {
    let town = gastown();
    town.polecat_worktree("slit");
    town.tracker.set_agents(
        &town.rig_path(),
        vec![AgentBeadBuilder::polecat("gastown", "slit")
            .hook("gt-abc")
            .updated_at(town.clock.utc_now())
            .build()],
    );

    town.daemon.heartbeat().await;
    let restarts_after_first =
        town.daemon.restarts().record("gastown-polecat-slit").unwrap().restart_count;

    // Second tick: the session is alive, nothing else happens
    town.clock.advance(Duration::from_secs(180));
    town.daemon.heartbeat().await;
    assert_eq!(
        town.daemon.restarts().record("gastown-polecat-slit").unwrap().restart_count,
        restarts_after_first
    );
    assert!(town.mail.sent_to("mayor").is_empty());
}
