// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A flapping DB server raises the signal file and escalates; sustained
//! health clears both.

use crate::specs::prelude::*;
use gt_daemon::DoltManager;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn dolt_config(port: u16) -> gt_core::DoltServerConfig {
    gt_core::DoltServerConfig {
        enabled: true,
        port,
        restart_delay: Some("0s".to_string()),
        max_restart_delay: Some("1s".to_string()),
        max_restarts_in_window: 2,
        restart_window: Some("10m".to_string()),
        healthy_reset_interval: Some("0s".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn db_flap_escalates_then_recovery_clears() {
    let town = gastown();
    let port = free_port();
    let manager = DoltManager::with_server_command(
        dolt_config(port),
        town.paths.clone(),
        town.clock.clone(),
        vec!["sleep".to_string(), "300".to_string()],
    );
    // Rebuild the daemon with the managed DB attached
    let daemon = town.daemon.with_dolt(manager);

    // First pass starts the server; it never answers on the port, so each
    // later pass is a restart. The third restart exceeds the window.
    for _ in 0..4 {
        daemon.ensure_dolt().await;
    }

    assert!(town.paths.dolt_unhealthy_path().exists());
    assert_eq!(
        town.mail
            .sent_to("mayor")
            .iter()
            .filter(|m| m.subject.contains("dolt server unhealthy"))
            .count(),
        1
    );

    // Something starts answering: continuous health clears the signal,
    // resets the delay, and drops the escalated flag.
    let _listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    daemon.ensure_dolt().await;

    assert!(!town.paths.dolt_unhealthy_path().exists());
    let feed = daemon.feed().events();
    assert!(feed.iter().any(|e| e.kind == "dolt" && e.detail.contains("recovered")));

    // Clean up the spawned placeholder server
    if let Some(dolt) = daemon.dolt_manager() {
        dolt.stop().await;
    }
}
