// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recognized witness mail drains; unrecognized mail stays and escalates.

use crate::specs::prelude::*;

#[tokio::test]
async fn unrecognized_mail_survives_and_escalates_once() {
    let town = gastown();
    town.mail.push("gastown/witness", "m-1", "WEIRD_THING foo", "");

    town.daemon.heartbeat().await;

    // Not deleted
    let inbox = town.mail.inbox_of("gastown/witness");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].subject, "WEIRD_THING foo");

    // One help-request escalation with the rig as its dedup key
    assert_eq!(town.escalations_containing("WEIRD_THING foo").len(), 1);

    // Three ticks later, still exactly one escalation (30 minute dedup)
    for _ in 0..3 {
        town.clock.advance(Duration::from_secs(180));
        town.daemon.heartbeat().await;
    }
    assert_eq!(town.escalations_containing("WEIRD_THING foo").len(), 1);

    // Past the window it fires again
    town.clock.advance(Duration::from_secs(30 * 60));
    town.daemon.heartbeat().await;
    assert_eq!(town.escalations_containing("WEIRD_THING foo").len(), 2);
}

#[tokio::test]
async fn protocol_mail_is_consumed_in_the_same_tick() {
    let town = gastown();
    town.mail.push("gastown/witness", "m-1", "POLECAT_DONE gt-abc", "");
    town.mail.push("gastown/witness", "m-2", "HANDOFF gt-def", "");
    town.mail.push("gastown/witness", "m-3", "WEIRD_THING foo", "");

    town.daemon.heartbeat().await;

    // Recognized drained, unrecognized kept
    let inbox = town.mail.inbox_of("gastown/witness");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].id, "m-3");
}
