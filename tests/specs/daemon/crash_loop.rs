// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Five rapid restarts freeze an agent until an operator intervenes.

use crate::specs::prelude::*;

#[tokio::test]
async fn crash_loop_freezes_the_witness() {
    let town = gastown();

    // Five die/restart rounds, each inside the 15 minute window
    for round in 0..5 {
        if let Some(remaining) = town.daemon.restarts().backoff_remaining("gastown-witness") {
            town.clock.advance(remaining);
        }
        town.daemon.heartbeat().await;
        assert!(town.mux.has("gt-gastown-witness"), "round {round}");
        town.mux.kill_session("gt-gastown-witness").await.unwrap();
    }

    // Frozen: CanRestart is false and ticks stop spawning
    assert!(town.daemon.restarts().in_crash_loop("gastown-witness"));
    town.clock.advance(Duration::from_secs(3600));
    town.daemon.heartbeat().await;
    assert!(!town.mux.has("gt-gastown-witness"));

    // Exactly one crash-loop escalation
    assert_eq!(town.escalations_containing("crash loop").len(), 1);

    // clear-backoff thaws it
    town.daemon.restarts().clear_crash_loop("gastown-witness").unwrap();
    town.daemon.heartbeat().await;
    assert!(town.mux.has("gt-gastown-witness"));
}
