// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{gastown, town};
use gt_adapters::MuxCall;
use gt_core::role::{ENV_ROLE, ENV_TOWN_ROOT};
use std::time::Duration as StdDuration;

fn witness_id() -> ParsedIdentity {
    ParsedIdentity::rig_singleton(RoleType::Witness, "gastown").unwrap()
}

#[tokio::test]
async fn healthy_agent_is_left_alone_and_success_recorded() {
    let town = gastown();
    town.mux.add_session("gt-gastown-witness", true);

    let outcome = town.daemon.ensure_agent(&witness_id()).await;
    assert_eq!(outcome, EnsureOutcome::Healthy);
    assert!(town.mux.has("gt-gastown-witness"));
    assert!(town.mux.sent_keys("gt-gastown-witness").is_empty());
}

#[tokio::test]
async fn missing_session_is_started_with_env_theme_and_beacon() {
    let town = gastown();

    let outcome = town.daemon.ensure_agent(&witness_id()).await;
    assert_eq!(outcome, EnsureOutcome::Started);

    let session = "gt-gastown-witness";
    assert!(town.mux.has(session));
    assert_eq!(
        town.mux.work_dir_of(session).unwrap(),
        town.paths.root.join("gastown").join("witness")
    );

    let env = town.mux.env_of(session);
    assert!(env.contains(&(ENV_ROLE.to_string(), "witness".to_string())));
    assert!(env
        .contains(&(ENV_TOWN_ROOT.to_string(), town.paths.root.display().to_string())));

    let options = town.mux.options_of(session);
    assert!(options.iter().any(|(k, _)| k == "status-style"));

    // Startup command carries the runtime and a beacon naming the agent,
    // followed by the permissions auto-accept keypress.
    let keys = town.mux.sent_keys(session);
    assert_eq!(keys.len(), 2);
    assert!(keys[0].starts_with("gt-test-runtime \""));
    assert!(keys[0].contains("gastown/witness"));
    assert_eq!(keys[1], "");

    // The restart was recorded: an immediate second pass is backed off.
    town.mux.kill_session(session).await.unwrap();
    assert_eq!(town.daemon.ensure_agent(&witness_id()).await, EnsureOutcome::BackedOff);
}

#[tokio::test]
async fn degraded_sessions_are_killed_then_restarted() {
    for health in [gt_adapters::SessionHealth::Zombie, gt_adapters::SessionHealth::Hung] {
        let town = gastown();
        town.mux.add_session("gt-gastown-witness", true);
        town.mux.set_health("gt-gastown-witness", health);

        let outcome = town.daemon.ensure_agent(&witness_id()).await;
        assert_eq!(outcome, EnsureOutcome::Started, "{health:?}");
        assert!(town
            .mux
            .calls()
            .contains(&MuxCall::KillWithProcesses { name: "gt-gastown-witness".to_string() }));
        // A fresh session replaced the degraded one
        assert!(town.mux.has("gt-gastown-witness"));
    }
}

#[tokio::test]
async fn backoff_gates_the_start_path() {
    let town = gastown();

    assert_eq!(town.daemon.ensure_agent(&witness_id()).await, EnsureOutcome::Started);
    town.mux.kill_session("gt-gastown-witness").await.unwrap();

    // Still inside the 30s backoff
    assert_eq!(town.daemon.ensure_agent(&witness_id()).await, EnsureOutcome::BackedOff);

    town.clock.advance(StdDuration::from_secs(31));
    assert_eq!(town.daemon.ensure_agent(&witness_id()).await, EnsureOutcome::Started);
}

#[tokio::test]
async fn crash_loop_freezes_restarts_and_escalates_once() {
    let town = gastown();

    // Five rapid die/restart rounds
    for i in 0..5 {
        let backoff = town.daemon.restarts().backoff_remaining("gastown-witness");
        if let Some(remaining) = backoff {
            town.clock.advance(remaining);
        }
        let outcome = town.daemon.ensure_agent(&witness_id()).await;
        assert_eq!(outcome, EnsureOutcome::Started, "round {i}");
        town.mux.kill_session("gt-gastown-witness").await.unwrap();
    }

    assert!(town.daemon.restarts().in_crash_loop("gastown-witness"));
    town.clock.advance(StdDuration::from_secs(3600));
    assert_eq!(town.daemon.ensure_agent(&witness_id()).await, EnsureOutcome::CrashLooped);
    assert!(!town.mux.has("gt-gastown-witness"));

    // Exactly one crash-loop escalation went to the coordinator
    let escalations: Vec<_> = town
        .mail
        .sent_to("mayor")
        .into_iter()
        .filter(|m| m.subject.contains("crash loop"))
        .collect();
    assert_eq!(escalations.len(), 1);

    // Operator intervention thaws it
    town.daemon.restarts().clear_crash_loop("gastown-witness").unwrap();
    assert_eq!(town.daemon.ensure_agent(&witness_id()).await, EnsureOutcome::Started);
}

#[tokio::test]
async fn parked_rig_is_not_ensured() {
    let town = town(r#"{"rigs":{"gastown":{"status":"parked"}}}"#, "");
    let outcome = town.daemon.ensure_agent(&witness_id()).await;
    assert!(matches!(outcome, EnsureOutcome::NotOperational(_)));
    assert!(!town.mux.has("gt-gastown-witness"));
}

#[tokio::test]
async fn docked_label_on_rig_bead_blocks_ensure() {
    let town = gastown();
    town.tracker.set_rig_labels("gastown", vec!["status:docked".to_string()]);

    let outcome = town.daemon.ensure_agent(&witness_id()).await;
    assert!(matches!(outcome, EnsureOutcome::NotOperational(_)));
}

#[tokio::test]
async fn town_roles_skip_the_rig_predicate() {
    let town = town(r#"{"rigs":{"gastown":{"status":"parked"}}}"#, "");
    let mayor = ParsedIdentity::town(RoleType::Mayor).unwrap();
    assert_eq!(town.daemon.ensure_agent(&mayor).await, EnsureOutcome::Started);
    assert!(town.mux.has("gt-mayor"));
}

#[tokio::test]
async fn kill_disabled_role_removes_leftovers_with_descendants() {
    let town = gastown();
    town.mux.add_session("gt-gastown-refinery", true);

    town.daemon.kill_disabled_role(RoleType::Refinery, Some("gastown")).await;
    assert!(!town.mux.has("gt-gastown-refinery"));
    assert!(town
        .mux
        .calls()
        .contains(&MuxCall::KillWithProcesses { name: "gt-gastown-refinery".to_string() }));
}

#[tokio::test]
async fn custom_rig_prefix_shapes_the_session_name() {
    let town = town(r#"{"rigs":{"gastown":{"prefix":"acme"}}}"#, "");
    town.daemon.ensure_agent(&witness_id()).await;
    assert!(town.mux.has("acme-gastown-witness"));
}
