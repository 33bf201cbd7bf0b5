// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gas Town Daemon (gtd)
//!
//! Singleton supervisor for one town root. Typically managed by the `gt`
//! CLI; the surfaces here are deliberately small: start (foreground),
//! stop, status, clear-backoff, orphans, kill-orphans.

use gt_adapters::{proc, BeadsCli, GtMailCli, TmuxAdapter};
use gt_core::SystemClock;
use gt_daemon::lifecycle::{self, TownPaths};
use gt_daemon::{env, Daemon, DaemonDeps, DoltManager, LifecycleError, RestartTracker, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Exit codes of the CLI contract.
const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_NOT_RUNNING: i32 = 2;
const EXIT_INVALID_PID: i32 = 3;
const EXIT_PREFLIGHT: i32 = 4;

/// Startup rotation threshold, same cap as the patrol step.
const MAX_LOG_SIZE: u64 = 100 * 1024 * 1024;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match args.first().map(String::as_str) {
        None | Some("start") => cmd_start().await,
        Some("stop") => cmd_stop().await,
        Some("status") => cmd_status().await,
        Some("clear-backoff") => cmd_clear_backoff(args.get(1).map(String::as_str)),
        Some("orphans") => cmd_orphans().await,
        Some("kill-orphans") => cmd_kill_orphans().await,
        Some("--version" | "-V" | "-v") => {
            println!("gtd {}", env::VERSION);
            EXIT_OK
        }
        Some("--help" | "-h" | "help") => {
            print_help();
            EXIT_OK
        }
        Some(other) => {
            eprintln!("error: unexpected argument '{other}'");
            eprintln!("Usage: gtd [start|stop|status|clear-backoff <agent>|orphans|kill-orphans]");
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

fn print_help() {
    println!("gtd {}", env::VERSION);
    println!("Gas Town Daemon - singleton supervisor for one town root");
    println!();
    println!("USAGE:");
    println!("    gtd [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    start            Run the daemon in the foreground (default)");
    println!("    stop             Signal the running daemon to shut down");
    println!("    status           Show daemon state for this town");
    println!("    clear-backoff    Clear backoff/crash-loop for an agent");
    println!("    orphans          List orphaned daemon processes");
    println!("    kill-orphans     Terminate orphaned daemon processes");
    println!();
    println!("The town root comes from GT_TOWN_ROOT (default ~/gt).");
}

fn town_paths() -> Result<TownPaths, i32> {
    match env::town_root() {
        Ok(root) => Ok(TownPaths::new(root)),
        Err(e) => {
            eprintln!("gtd: {e}");
            Err(EXIT_FAILURE)
        }
    }
}

async fn cmd_start() -> i32 {
    let Ok(paths) = town_paths() else { return EXIT_FAILURE };

    if let Err(e) = std::fs::create_dir_all(paths.daemon_dir()) {
        eprintln!("gtd: cannot create {}: {e}", paths.daemon_dir().display());
        return EXIT_FAILURE;
    }

    // Rotate before the appender opens the file.
    gt_daemon::rotate_log_if_needed(&paths.log_path(), MAX_LOG_SIZE);

    // Non-blocking file logging; no stderr once running in the background.
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths.log_path())
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("gtd: cannot open log file: {e}");
            return EXIT_FAILURE;
        }
    };
    let (writer, _log_guard) = tracing_appender::non_blocking(log_file);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    info!(town = %paths.root.display(), "starting town daemon");

    let startup = match lifecycle::startup(&paths) {
        Ok(startup) => startup,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(paths.pid_path()).unwrap_or_default();
            eprintln!("gtd is already running for {}", paths.root.display());
            if !pid.trim().is_empty() {
                eprintln!("  pid: {}", pid.trim());
            }
            return EXIT_NOT_RUNNING;
        }
        Err(LifecycleError::Preflight(lines)) => {
            eprintln!("gtd: pre-flight failed:");
            for line in &lines {
                eprintln!("  {line}");
            }
            error!(failures = lines.len(), "pre-flight failed");
            return EXIT_PREFLIGHT;
        }
        Err(e) => {
            eprintln!("gtd: startup failed: {e}");
            error!(error = %e, "startup failed");
            return EXIT_FAILURE;
        }
    };

    let mux = match TmuxAdapter::resolve() {
        Ok(mux) => mux,
        Err(e) => {
            eprintln!("gtd: {e}");
            return EXIT_FAILURE;
        }
    };
    let tracker = match BeadsCli::resolve() {
        Ok(tracker) => tracker,
        Err(e) => {
            eprintln!("gtd: {e}");
            return EXIT_FAILURE;
        }
    };
    let mail = match GtMailCli::resolve() {
        Ok(mail) => mail,
        Err(e) => {
            eprintln!("gtd: {e}");
            return EXIT_FAILURE;
        }
    };

    let daemon = match Daemon::new(
        paths.clone(),
        startup.config.clone(),
        startup.rigs.clone(),
        DaemonDeps { mux, tracker, mail },
        SystemClock,
        env::runtime_command(),
    ) {
        Ok(daemon) => daemon,
        Err(e) => {
            eprintln!("gtd: {e}");
            return EXIT_FAILURE;
        }
    };

    let dolt_config = &startup.config.patrols.dolt_server;
    let daemon = if dolt_config.enabled {
        match DoltManager::new(dolt_config.clone(), paths.clone(), SystemClock) {
            Ok(dolt) => daemon.with_dolt(dolt),
            Err(e) => {
                // The town limps along without its DB; escalations and the
                // signal file surface the gap.
                warn!(error = %e, "dolt server unavailable, continuing without it");
                daemon
            }
        }
    } else {
        daemon
    };

    // Signal ready for whoever is waiting on startup.
    println!("READY");

    let result = Arc::new(daemon).run(CancellationToken::new()).await;
    startup.handle.shutdown();
    match result {
        Ok(()) => EXIT_OK,
        Err(e) => {
            error!(error = %e, "run loop failed");
            EXIT_FAILURE
        }
    }
}

async fn cmd_stop() -> i32 {
    let Ok(paths) = town_paths() else { return EXIT_FAILURE };
    match lifecycle::running_pid(&paths).await {
        Ok(Some(pid)) => {
            proc::send_term(pid);
            let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
            while proc::pid_alive(pid) {
                if tokio::time::Instant::now() >= deadline {
                    proc::send_kill(pid);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            println!("stopped gtd (pid {pid})");
            EXIT_OK
        }
        Ok(None) | Err(LifecycleError::StalePid { .. }) => {
            eprintln!("gtd is not running for {}", paths.root.display());
            EXIT_NOT_RUNNING
        }
        Err(LifecycleError::InvalidPid { .. }) => {
            eprintln!("gtd: invalid PID file (removed)");
            EXIT_INVALID_PID
        }
        Err(e) => {
            eprintln!("gtd: {e}");
            EXIT_FAILURE
        }
    }
}

async fn cmd_status() -> i32 {
    let Ok(paths) = town_paths() else { return EXIT_FAILURE };
    let state = StateStore::new(paths.state_path()).load().unwrap_or_default();

    match lifecycle::running_pid(&paths).await {
        Ok(Some(pid)) => {
            let now = chrono::Utc::now();
            println!("gtd running (pid {pid}) for {}", paths.root.display());
            if let Some(started) = state.started_at {
                let uptime = (now - started).num_seconds().max(0) as u64;
                println!("  uptime:     {}", gt_core::format_elapsed(uptime));
            }
            if let Some(heartbeat) = state.last_heartbeat {
                let age = (now - heartbeat).num_seconds().max(0) as u64;
                println!(
                    "  heartbeat:  {} ago (count {})",
                    gt_core::format_elapsed(age),
                    state.heartbeat_count
                );
            }
            if paths.dolt_unhealthy_path().exists() {
                println!("  dolt:       UNHEALTHY (signal file present)");
            }
            EXIT_OK
        }
        Ok(None) | Err(LifecycleError::StalePid { .. }) => {
            println!("gtd not running for {}", paths.root.display());
            EXIT_NOT_RUNNING
        }
        Err(LifecycleError::InvalidPid { .. }) => {
            eprintln!("gtd: invalid PID file (removed)");
            EXIT_INVALID_PID
        }
        Err(e) => {
            eprintln!("gtd: {e}");
            EXIT_FAILURE
        }
    }
}

fn cmd_clear_backoff(agent: Option<&str>) -> i32 {
    let Some(agent) = agent else {
        eprintln!("Usage: gtd clear-backoff <agent>  (dashed identity, e.g. gastown-witness)");
        return EXIT_FAILURE;
    };
    let Ok(paths) = town_paths() else { return EXIT_FAILURE };
    let tracker = match RestartTracker::load(paths.restart_state_path(), SystemClock) {
        Ok(tracker) => tracker,
        Err(e) => {
            eprintln!("gtd: {e}");
            return EXIT_FAILURE;
        }
    };
    match tracker.clear_crash_loop(agent) {
        Ok(()) => {
            println!("cleared backoff for {agent}");
            EXIT_OK
        }
        Err(e) => {
            eprintln!("gtd: {e}");
            EXIT_FAILURE
        }
    }
}

async fn cmd_orphans() -> i32 {
    let orphans = lifecycle::find_orphaned().await;
    if orphans.is_empty() {
        println!("no orphaned daemons");
    } else {
        for orphan in orphans {
            println!("{:>8}  {}", orphan.pid, orphan.command);
        }
    }
    EXIT_OK
}

async fn cmd_kill_orphans() -> i32 {
    let count = lifecycle::kill_orphaned().await;
    println!("killed {count} orphaned daemon(s)");
    EXIT_OK
}
