// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::gastown;

#[yare::parameterized(
    polecat_done   = { "POLECAT_DONE gt-abc",      Some(Protocol::PolecatDone) },
    shutdown       = { "LIFECYCLE:Shutdown",        Some(Protocol::LifecycleShutdown) },
    help           = { "HELP: stuck on merge",      Some(Protocol::Help) },
    merged         = { "MERGED polecat/slit",       Some(Protocol::Merged) },
    merge_failed   = { "MERGE_FAILED polecat/slit", Some(Protocol::MergeFailed) },
    swarm          = { "SWARM_START cv-1",          Some(Protocol::SwarmStart) },
    handoff        = { "HANDOFF gt-abc",            Some(Protocol::Handoff) },
    merge_ready    = { "MERGE_READY polecat/slit",  Some(Protocol::MergeReady) },
    unknown        = { "WEIRD_THING foo",           None },
    lifecycle_other = { "LIFECYCLE: cycle",         None },
    empty          = { "",                          None },
)]
fn classification(subject: &str, expected: Option<Protocol>) {
    assert_eq!(Protocol::classify(subject), expected);
}

#[tokio::test]
async fn recognized_messages_are_deleted() {
    let town = gastown();
    town.mail.push("gastown/witness", "m-1", "POLECAT_DONE gt-abc", "");
    town.mail.push("gastown/witness", "m-2", "MERGED polecat/slit", "");

    town.daemon.drain_witness_inboxes().await;

    assert!(town.mail.inbox_of("gastown/witness").is_empty());
    // No escalation for protocol traffic
    assert!(town.mail.sent_to("mayor").is_empty());
}

#[tokio::test]
async fn unrecognized_messages_stay_and_escalate_with_rig_dedup() {
    let town = gastown();
    town.mail.push("gastown/witness", "m-1", "WEIRD_THING foo", "");

    town.daemon.drain_witness_inboxes().await;

    // Not deleted
    let inbox = town.mail.inbox_of("gastown/witness");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].id, "m-1");

    // One escalation naming the subject
    let sent = town.mail.sent_to("mayor");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains("WEIRD_THING foo"));

    // Later ticks inside the 30 minute window stay quiet
    town.daemon.drain_witness_inboxes().await;
    town.daemon.drain_witness_inboxes().await;
    assert_eq!(town.mail.sent_to("mayor").len(), 1);
}

#[tokio::test]
async fn read_messages_are_skipped() {
    let town = gastown();
    let mut message = gt_adapters::MailMessage {
        id: "m-1".to_string(),
        from: "gastown/polecat/slit".to_string(),
        to: "gastown/witness".to_string(),
        subject: "POLECAT_DONE gt-abc".to_string(),
        body: String::new(),
        read: true,
        sent_at: town.clock.utc_now(),
    };
    town.mail.push_message("gastown/witness", message.clone());
    message.id = "m-2".to_string();
    message.read = false;
    town.mail.push_message("gastown/witness", message);

    town.daemon.drain_witness_inboxes().await;

    // Only the unread one was consumed
    let inbox = town.mail.inbox_of("gastown/witness");
    assert_eq!(inbox.len(), 1);
    assert!(inbox[0].read);
}

#[tokio::test]
async fn shutdown_request_kills_the_named_session() {
    let town = gastown();
    town.mux.add_session("gt-gastown-slit", true);
    town.mail.push(
        "gastown/witness",
        "m-1",
        "LIFECYCLE:Shutdown",
        r#"{"agent":"gastown/polecat/slit"}"#,
    );

    town.daemon.drain_witness_inboxes().await;

    assert!(!town.mux.has("gt-gastown-slit"));
    assert!(town.mail.inbox_of("gastown/witness").is_empty());
}

#[tokio::test]
async fn merge_failed_escalates_per_branch() {
    let town = gastown();
    town.mail.push(
        "gastown/witness",
        "m-1",
        "MERGE_FAILED",
        r#"{"branch":"polecat/slit"}"#,
    );
    town.mail.push(
        "gastown/witness",
        "m-2",
        "MERGE_FAILED",
        r#"{"branch":"polecat/nux"}"#,
    );

    town.daemon.drain_witness_inboxes().await;

    // Different branches, different dedup keys: both escalate
    let sent = town.mail.sent_to("mayor");
    assert_eq!(sent.len(), 2);
    assert!(town.mail.inbox_of("gastown/witness").is_empty());
}

#[tokio::test]
async fn handoff_and_merge_ready_are_drained_silently() {
    let town = gastown();
    town.mail.push("gastown/witness", "m-1", "HANDOFF gt-abc", "");
    town.mail.push("gastown/witness", "m-2", "MERGE_READY polecat/slit", "");

    town.daemon.drain_witness_inboxes().await;

    assert!(town.mail.inbox_of("gastown/witness").is_empty());
    assert!(town.mail.sent_to("mayor").is_empty());
    // And no feed noise either
    assert!(town.daemon.feed().events().is_empty());
}

#[tokio::test]
async fn help_requests_are_forwarded_to_the_coordinator() {
    let town = gastown();
    town.mail.push("gastown/witness", "m-1", "HELP: stuck on rebase", "details");

    town.daemon.drain_witness_inboxes().await;

    let sent = town.mail.sent_to("mayor");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains("stuck on rebase"));
    // Forwarded help is protocol traffic: the original drains
    assert!(town.mail.inbox_of("gastown/witness").is_empty());
}

#[tokio::test]
async fn handler_failure_still_deletes_the_message() {
    let town = gastown();
    // Shutdown with an unparseable target: the handler errors
    town.mail.push(
        "gastown/witness",
        "m-1",
        "LIFECYCLE:Shutdown",
        r#"{"agent":"not a real identity"}"#,
    );

    town.daemon.drain_witness_inboxes().await;
    assert!(town.mail.inbox_of("gastown/witness").is_empty());
}
