// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Singleton enforcement and stale-PID reclaim for a town root.

use gt_daemon::lifecycle::{self, TownPaths};
use gt_daemon::LifecycleError;

fn town() -> (tempfile::TempDir, TownPaths) {
    let dir = tempfile::tempdir().unwrap();
    let paths = TownPaths::new(dir.path().to_path_buf());
    (dir, paths)
}

#[test]
fn exactly_one_of_two_concurrent_starts_wins() {
    let (_dir, paths) = town();

    let first = lifecycle::startup(&paths);
    let second = lifecycle::startup(&paths);

    let results = [first.is_ok(), second.is_ok()];
    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    assert!(matches!(second.unwrap_err(), LifecycleError::LockFailed(_)));
}

#[test]
fn threads_racing_for_the_same_town_produce_one_winner() {
    let (_dir, paths) = town();

    let barrier = std::sync::Arc::new(std::sync::Barrier::new(4));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let paths = paths.clone();
        let barrier = std::sync::Arc::clone(&barrier);
        handles.push(std::thread::spawn(move || {
            barrier.wait();
            // The winner holds its lock long enough for every loser to
            // have attempted and observed it held.
            match lifecycle::startup(&paths) {
                Ok(result) => {
                    std::thread::sleep(std::time::Duration::from_millis(300));
                    drop(result);
                    true
                }
                Err(_) => false,
            }
        }));
    }
    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap_or(false))
        .filter(|won| *won)
        .count();
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn stale_pid_file_is_reclaimed() {
    let (_dir, paths) = town();
    std::fs::create_dir_all(paths.daemon_dir()).unwrap();

    // A live PID whose command line is not the daemon (this test process)
    std::fs::write(paths.pid_path(), format!("{}\n", std::process::id())).unwrap();

    assert!(!lifecycle::is_running(&paths).await);
    assert!(!paths.pid_path().exists());

    // Dead PID
    std::fs::write(paths.pid_path(), format!("{}\n", i32::MAX - 2)).unwrap();
    let err = lifecycle::running_pid(&paths).await.unwrap_err();
    assert!(matches!(err, LifecycleError::StalePid { .. }));
    assert!(!paths.pid_path().exists());
}
