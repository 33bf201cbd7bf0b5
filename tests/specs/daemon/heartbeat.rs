// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat-level behavior: state persistence, idle gate, shutdown lock,
//! disabled patrols.

use crate::specs::prelude::*;
use fs2::FileExt;

#[tokio::test]
async fn heartbeat_updates_the_state_file() {
    let town = gastown();

    town.daemon.heartbeat().await;
    let state = town.daemon.state_store().load().unwrap();
    assert!(state.running);
    assert_eq!(state.pid, std::process::id());
    assert_eq!(state.heartbeat_count, 1);
    assert!(state.started_at.is_some());

    town.clock.advance(Duration::from_secs(180));
    town.daemon.heartbeat().await;
    let state = town.daemon.state_store().load().unwrap();
    assert_eq!(state.heartbeat_count, 2);
    assert!(state.last_heartbeat > state.started_at);

    town.daemon.save_stopped_state();
    assert!(!town.daemon.state_store().load().unwrap().running);
}

#[tokio::test]
async fn heartbeat_ensures_all_enabled_singletons() {
    let town = gastown();
    town.daemon.heartbeat().await;

    for session in ["gt-mayor", "gt-deacon", "gt-gastown-witness", "gt-gastown-refinery"] {
        assert!(town.mux.has(session), "{session}");
    }
}

#[tokio::test]
async fn disabled_patrols_kill_their_leftovers() {
    let config = r#"{
        "patrols": {
            "deacon": { "enabled": false },
            "refinery": { "enabled": false }
        }
    }"#;
    let town = town(r#"{"rigs":{"gastown":{}}}"#, config);
    town.mux.add_session("gt-deacon", true);
    town.mux.add_session("gt-gastown-refinery", true);

    town.daemon.heartbeat().await;

    assert!(!town.mux.has("gt-deacon"));
    assert!(!town.mux.has("gt-gastown-refinery"));
    // Enabled ones still come up
    assert!(town.mux.has("gt-mayor"));
    assert!(town.mux.has("gt-gastown-witness"));
}

#[tokio::test]
async fn shutdown_lock_skips_the_whole_heartbeat() {
    let town = gastown();

    let lock_path = town.paths.shutdown_lock_path();
    let lock_file = std::fs::File::create(&lock_path).unwrap();
    lock_file.try_lock_exclusive().unwrap();

    let report = town.daemon.heartbeat().await;
    assert!(report.skipped);
    assert!(!town.mux.has("gt-mayor"));
    assert_eq!(town.daemon.state_store().load().unwrap().heartbeat_count, 0);

    // Lock released: the next heartbeat runs
    lock_file.unlock().unwrap();
    let report = town.daemon.heartbeat().await;
    assert!(!report.skipped);
    assert!(town.mux.has("gt-mayor"));
}

#[tokio::test]
async fn town_is_idle_iff_nothing_is_in_progress() {
    let town = gastown();
    let report = town.daemon.heartbeat().await;
    assert!(report.town_idle);

    town.tracker.set_in_progress(&town.rig_path(), 2);
    town.clock.advance(Duration::from_secs(180));
    let report = town.daemon.heartbeat().await;
    assert!(!report.town_idle);
}

#[tokio::test]
async fn remotes_push_respects_the_toggle() {
    let town = town(
        r#"{"rigs":{"gastown":{}}}"#,
        r#"{"patrols":{"dolt_remotes":{"enabled":true}}}"#,
    );
    town.daemon.push_remotes().await;
    assert_eq!(town.tracker.synced_dirs(), vec![town.rig_path()]);

    let quiet = gastown();
    quiet.daemon.push_remotes().await;
    assert!(quiet.tracker.synced_dirs().is_empty());
}
