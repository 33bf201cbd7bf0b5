// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claim-then-execute lifecycle requests against the coordinator.

use crate::specs::prelude::*;

#[tokio::test]
async fn cycle_request_is_claimed_and_executed_in_one_tick() {
    let town = gastown();
    town.mux.add_session("gt-deacon", true);
    town.mail.push("deacon", "m-1", "LIFECYCLE: cycle", r#"{"action":"cycle"}"#);

    town.daemon.heartbeat().await;

    // Deleted in the same tick
    assert!(town.mail.inbox_of("deacon").is_empty());

    // Old session killed with descendants; a fresh one exists with the
    // role environment and a startup command
    assert!(town.mux.kill_count("gt-deacon") >= 1);
    assert!(town.mux.has("gt-deacon"));
    let env = town.mux.env_of("gt-deacon");
    assert!(env.iter().any(|(k, v)| k == "GT_ROLE" && v == "deacon"));
    assert!(!town.mux.sent_keys("gt-deacon").is_empty());

    // A second tick without a new message has no effect
    let kills = town.mux.kill_count("gt-deacon");
    town.clock.advance(Duration::from_secs(180));
    town.daemon.heartbeat().await;
    assert_eq!(town.mux.kill_count("gt-deacon"), kills);
}

#[tokio::test]
async fn failed_action_after_claim_is_not_retried() {
    let town = gastown();
    // Target identity that cannot be parsed: claim still happens
    town.mail.push(
        "deacon",
        "m-1",
        "LIFECYCLE: shutdown",
        r#"{"action":"shutdown","agent":"///"}"#,
    );

    town.daemon.process_lifecycle_requests().await;
    assert!(town.mail.inbox_of("deacon").is_empty());

    // Next tick: nothing left to process
    town.daemon.process_lifecycle_requests().await;
    assert!(town.mail.inbox_of("deacon").is_empty());
}
