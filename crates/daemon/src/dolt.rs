// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Managed dolt sql-server.
//!
//! One long-running external SQL server the rest of the town depends on.
//! The manager owns liveness, health probing, and a windowed
//! restart-with-backoff; persistent unhealth raises a filesystem signal
//! file (`daemon/DOLT_UNHEALTHY`) so external tools can observe
//! degradation without talking to the daemon.
//!
//! Both the health ticker and the heartbeat call [`DoltManager::ensure_running`];
//! it is idempotent, and every path that sleeps re-checks liveness on
//! resume so concurrent callers cannot double-start the server.

use gt_core::{Clock, DoltServerConfig};
use crate::lifecycle::TownPaths;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// How long a freshly spawned server gets before its first health probe.
const WARMUP: Duration = Duration::from_millis(250);
/// Health probe connect timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// How long stop polls after SIGTERM before SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Errors from dolt supervision.
#[derive(Debug, Error)]
pub enum DoltError {
    #[error("dolt binary not found")]
    BinaryNotFound,

    #[error("failed to spawn dolt server: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Observable outcomes of an `ensure_running` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoltEvent {
    /// Server was started (first start or after restart backoff).
    Started,
    /// A restart was scheduled and performed; carries the delay slept.
    Restarted { delay: Duration },
    /// Too many restarts inside the window; signal file written.
    WindowExceeded { count: u32, window: Duration },
    /// Continuous health for the reset interval; signal file cleared.
    Recovered,
}

/// Windowed exponential backoff bookkeeping.
struct RestartWindow {
    current_delay: Duration,
    restart_times: Vec<Instant>,
    escalated: bool,
}

impl RestartWindow {
    fn new(initial: Duration) -> Self {
        Self { current_delay: initial, restart_times: Vec::new(), escalated: false }
    }

    /// Record a restart at `now`; advance the delay and report whether the
    /// window was newly exceeded.
    fn note_restart(&mut self, now: Instant, config: &DoltServerConfig) -> Option<u32> {
        let window = config.restart_window();
        self.restart_times.retain(|t| now.duration_since(*t) <= window);
        self.restart_times.push(now);

        self.current_delay =
            (self.current_delay * 2).min(config.max_restart_delay()).max(config.restart_delay());

        let count = self.restart_times.len() as u32;
        if count > config.max_restarts_in_window && !self.escalated {
            self.escalated = true;
            return Some(count);
        }
        None
    }

    fn reset(&mut self, config: &DoltServerConfig) {
        self.current_delay = config.restart_delay();
        self.restart_times.clear();
        self.escalated = false;
    }
}

struct DoltState {
    child: Option<tokio::process::Child>,
    /// Whether this manager has ever started the server; a later death is
    /// then a restart (with backoff) rather than a first start.
    ever_started: bool,
    healthy_since: Option<Instant>,
    window: RestartWindow,
    /// A restart sleep is in flight; other callers back off.
    restarting: bool,
}

/// Supervisor for the dolt sql-server subprocess.
pub struct DoltManager<C: Clock> {
    config: DoltServerConfig,
    paths: TownPaths,
    clock: C,
    server_command: Vec<String>,
    state: Mutex<DoltState>,
}

impl<C: Clock> DoltManager<C> {
    /// Build a manager around the real `dolt` binary.
    pub fn new(
        config: DoltServerConfig,
        paths: TownPaths,
        clock: C,
    ) -> Result<Self, DoltError> {
        let bin = which::which("dolt").map_err(|_| DoltError::BinaryNotFound)?;
        let data_dir = match &config.data_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => paths.root.join(dir),
            None => paths.daemon_dir().join("dolt"),
        };
        let command = vec![
            bin.display().to_string(),
            "sql-server".to_string(),
            "--host".to_string(),
            config.host.clone(),
            "--port".to_string(),
            config.port.to_string(),
            "--data-dir".to_string(),
            data_dir.display().to_string(),
        ];
        Ok(Self::with_server_command(config, paths, clock, command))
    }

    /// Build a manager around an arbitrary server command line.
    pub fn with_server_command(
        config: DoltServerConfig,
        paths: TownPaths,
        clock: C,
        server_command: Vec<String>,
    ) -> Self {
        let initial = config.restart_delay();
        Self {
            config,
            paths,
            clock,
            server_command,
            state: Mutex::new(DoltState {
                child: None,
                ever_started: false,
                healthy_since: None,
                window: RestartWindow::new(initial),
                restarting: false,
            }),
        }
    }

    fn log_path(&self) -> PathBuf {
        match &self.config.log_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.paths.root.join(path),
            None => self.paths.dolt_log_path(),
        }
    }

    /// Whether the unhealthy signal file is currently raised.
    pub fn unhealthy_signal_raised(&self) -> bool {
        self.paths.dolt_unhealthy_path().exists()
    }

    /// TCP probe of the configured host:port.
    pub async fn health_check(&self) -> bool {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, tokio::net::TcpStream::connect(&addr)).await,
            Ok(Ok(_))
        )
    }

    /// Idempotent ensure: start if down, health-check if up, restart with
    /// backoff if unhealthy. Returns the observable events of this pass.
    pub async fn ensure_running(&self) -> Vec<DoltEvent> {
        if !self.config.enabled {
            return Vec::new();
        }
        if self.config.external {
            // Externally managed: health probe only, never start or stop.
            if !self.health_check().await {
                warn!("external dolt server failed health probe");
            }
            return Vec::new();
        }

        let needs_restart = {
            let mut state = self.state.lock().await;
            if state.restarting {
                // A backoff sleep is in flight; it re-checks on resume.
                return Vec::new();
            }

            if self.is_alive_locked(&mut state).await {
                if self.health_check().await {
                    return self.note_healthy_locked(&mut state);
                }
                warn!("dolt server is alive but unhealthy, scheduling restart");
                state.healthy_since = None;
                self.stop_locked(&mut state).await;
                true
            } else {
                state.healthy_since = None;
                if state.ever_started {
                    // It ran before and died: that is a restart, with backoff.
                    true
                } else {
                    // First start of this daemon's tenure.
                    return match self.start_locked(&mut state).await {
                        Ok(()) => vec![DoltEvent::Started],
                        Err(e) => {
                            warn!(error = %e, "failed to start dolt server");
                            Vec::new()
                        }
                    };
                }
            }
        };

        if needs_restart && self.config.auto_restart {
            self.restart_with_backoff().await
        } else {
            Vec::new()
        }
    }

    /// Stop the server: TERM, poll for exit, then KILL.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await;
    }

    async fn restart_with_backoff(&self) -> Vec<DoltEvent> {
        let delay = {
            let mut state = self.state.lock().await;
            if state.restarting {
                return Vec::new();
            }
            state.restarting = true;
            state.window.current_delay
        };

        // Sleep with the mutex released so health probes and stop() can
        // run; liveness is re-checked on resume.
        tokio::time::sleep(delay).await;

        let mut state = self.state.lock().await;
        state.restarting = false;

        if self.is_alive_locked(&mut state).await {
            // Someone else brought it up during the sleep.
            return Vec::new();
        }

        let mut events = Vec::new();
        match self.start_locked(&mut state).await {
            Ok(()) => events.push(DoltEvent::Restarted { delay }),
            Err(e) => {
                warn!(error = %e, "dolt restart failed");
            }
        }

        if let Some(count) = state.window.note_restart(self.clock.now(), &self.config) {
            let window = self.config.restart_window();
            self.raise_unhealthy_signal();
            events.push(DoltEvent::WindowExceeded { count, window });
        }
        events
    }

    /// Liveness of the tracked child, falling back to the PID file with
    /// command-line verification to defeat PID reuse.
    async fn is_alive_locked(&self, state: &mut DoltState) -> bool {
        if let Some(child) = state.child.as_mut() {
            match child.try_wait() {
                Ok(None) => return true,
                Ok(Some(_)) | Err(_) => {
                    state.child = None;
                }
            }
        }

        let Ok(content) = std::fs::read_to_string(self.paths.dolt_pid_path()) else {
            return false;
        };
        let Ok(pid) = content.trim().parse::<i32>() else { return false };
        if !gt_adapters::proc::pid_alive(pid) {
            return false;
        }
        let signature = self
            .server_command
            .first()
            .map(|bin| bin.rsplit('/').next().unwrap_or(bin).to_string())
            .unwrap_or_default();
        match gt_adapters::proc::process_command(pid).await {
            Some(command) => command.contains(&signature),
            None => false,
        }
    }

    /// Spawn the server detached from the daemon's process group so a
    /// daemon restart does not take the database down with it.
    async fn start_locked(&self, state: &mut DoltState) -> Result<(), DoltError> {
        // TOCTOU closure: re-check right before spawning.
        if self.is_alive_locked(state).await {
            return Ok(());
        }

        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        let log_err = log.try_clone()?;

        let Some((program, args)) = self.server_command.split_first() else {
            return Err(DoltError::BinaryNotFound);
        };

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0)
            .kill_on_drop(false);

        let child = command.spawn()?;
        if let Some(pid) = child.id() {
            let _ = std::fs::write(self.paths.dolt_pid_path(), format!("{pid}\n"));
            info!(pid, "dolt server started");
        }
        state.child = Some(child);
        state.ever_started = true;

        tokio::time::sleep(WARMUP).await;
        if self.health_check().await {
            state.healthy_since = Some(self.clock.now());
        }
        Ok(())
    }

    async fn stop_locked(&self, state: &mut DoltState) {
        let pid = match state.child.as_ref().and_then(|c| c.id()) {
            Some(pid) => Some(pid as i32),
            None => std::fs::read_to_string(self.paths.dolt_pid_path())
                .ok()
                .and_then(|s| s.trim().parse().ok()),
        };
        let Some(pid) = pid else { return };

        gt_adapters::proc::send_term(pid);
        let deadline = tokio::time::Instant::now() + STOP_GRACE;
        while gt_adapters::proc::pid_alive(pid) {
            if tokio::time::Instant::now() >= deadline {
                gt_adapters::proc::send_kill(pid);
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        if let Some(mut child) = state.child.take() {
            let _ = child.wait().await;
        }
        let _ = std::fs::remove_file(self.paths.dolt_pid_path());
        info!(pid, "dolt server stopped");
    }

    /// Healthy pass bookkeeping: after `healthy_reset_interval` of
    /// continuous health, reset the backoff and clear the signal file.
    fn note_healthy_locked(&self, state: &mut DoltState) -> Vec<DoltEvent> {
        let now = self.clock.now();
        let since = *state.healthy_since.get_or_insert(now);
        if now.duration_since(since) < self.config.healthy_reset_interval() {
            return Vec::new();
        }

        let was_escalated = state.window.escalated;
        state.window.reset(&self.config);
        if was_escalated {
            self.clear_unhealthy_signal();
            vec![DoltEvent::Recovered]
        } else {
            Vec::new()
        }
    }

    fn raise_unhealthy_signal(&self) {
        let path = self.paths.dolt_unhealthy_path();
        if let Err(e) = std::fs::write(&path, "dolt server restart window exceeded\n") {
            warn!(error = %e, "failed to write unhealthy signal file");
        }
    }

    fn clear_unhealthy_signal(&self) {
        let path = self.paths.dolt_unhealthy_path();
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(error = %e, "failed to remove unhealthy signal file");
            }
        }
    }
}

#[cfg(test)]
#[path = "dolt_tests.rs"]
mod tests;
