// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Three session deaths inside 30 seconds are systemic, not coincidence.

use crate::specs::prelude::*;

#[tokio::test]
async fn three_dead_polecats_emit_one_mass_death() {
    let town = gastown();
    let mut beads = Vec::new();
    for name in ["slit", "nux", "ace"] {
        town.polecat_worktree(name);
        beads.push(
            AgentBeadBuilder::polecat("gastown", name)
                .hook("gt-abc")
                .updated_at(town.clock.utc_now())
                .build(),
        );
    }
    town.tracker.set_agents(&town.rig_path(), beads);

    town.daemon.heartbeat().await;

    // Restarts were attempted for each polecat
    for name in ["slit", "nux", "ace"] {
        assert!(town.mux.has(&format!("gt-gastown-{name}")));
    }

    // Exactly one mass-death feed event and one escalation
    let feed = town.daemon.feed().events();
    assert_eq!(feed.iter().filter(|e| e.kind == "mass_death").count(), 1);
    assert_eq!(town.escalations_containing("mass death").len(), 1);

    // The deck cleared: one more death in the same window stays quiet
    town.polecat_worktree("dag");
    town.tracker.set_agents(
        &town.rig_path(),
        vec![AgentBeadBuilder::polecat("gastown", "dag")
            .hook("gt-xyz")
            .updated_at(town.clock.utc_now())
            .build()],
    );
    town.daemon.detect_polecat_crashes().await;
    assert_eq!(town.escalations_containing("mass death").len(), 1);
    assert_eq!(town.daemon.feed().events().iter().filter(|e| e.kind == "mass_death").count(), 1);
}
