// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multiplexer port.
//!
//! The authoritative liveness bit for every agent lives here: a session
//! found alive by the multiplexer is never concluded to be a crash. The
//! real adapter wraps `tmux`; the daemon never shells out to it directly.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Pane inactivity threshold beyond which a live session counts as hung.
pub const HUNG_AFTER: Duration = Duration::from_secs(30 * 60);

/// Shell names that mean "the agent process is gone, only the shell is left".
pub const SHELLS: &[&str] = &["bash", "zsh", "sh", "fish", "dash"];

/// Errors from multiplexer operations.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("multiplexer binary not found: {0}")]
    BinaryNotFound(String),

    #[error("failed to run multiplexer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("multiplexer command failed: {0}")]
    CommandFailed(String),

    #[error("timed out waiting for {what} in session {session}")]
    Timeout { session: String, what: String },
}

/// Triage of a live-or-dead session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionHealth {
    /// Session alive, agent process alive, recent pane activity.
    Healthy,
    /// Session alive but the agent process inside it is dead.
    Zombie,
    /// Session and agent alive but no pane activity beyond [`HUNG_AFTER`].
    Hung,
    /// No such session.
    Missing,
}

/// Operations the daemon needs from the terminal multiplexer.
#[async_trait]
pub trait MultiplexerPort: Clone + Send + Sync + 'static {
    async fn has_session(&self, name: &str) -> Result<bool, MuxError>;

    /// Whether the agent process (not just the shell) is alive in the session.
    async fn is_agent_alive(&self, name: &str) -> Result<bool, MuxError>;

    /// Healthy / zombie / hung / missing triage.
    async fn session_health(&self, name: &str) -> Result<SessionHealth, MuxError>;

    async fn new_session(&self, name: &str, work_dir: &Path) -> Result<(), MuxError>;

    /// Kill any existing session of this name, then create a fresh one.
    async fn ensure_session_fresh(&self, name: &str, work_dir: &Path) -> Result<(), MuxError>;

    /// Send a command line followed by Enter.
    async fn send_keys(&self, name: &str, command: &str) -> Result<(), MuxError>;

    /// Wait until the session's foreground command is no longer a plain shell.
    async fn wait_for_command(
        &self,
        name: &str,
        shells: &[&str],
        timeout: Duration,
    ) -> Result<(), MuxError>;

    async fn set_environment(&self, name: &str, key: &str, value: &str) -> Result<(), MuxError>;

    /// Set a session option (used for status-line theming).
    async fn set_option(&self, name: &str, key: &str, value: &str) -> Result<(), MuxError>;

    async fn kill_session(&self, name: &str) -> Result<(), MuxError>;

    /// Kill the session and every process descended from its panes.
    async fn kill_session_with_processes(&self, name: &str) -> Result<(), MuxError>;

    /// Type a short message into the session without disturbing its state.
    async fn nudge_session(&self, name: &str, message: &str) -> Result<(), MuxError>;

    /// Wait for pane activity to settle; returns false on timeout.
    async fn wait_for_idle(&self, name: &str, timeout: Duration) -> Result<bool, MuxError>;

    /// Register a pane-died marker so later triage can see the death.
    async fn set_pane_died_hook(&self, name: &str, id: &str) -> Result<(), MuxError>;

    /// Names of all live sessions.
    async fn list_sessions(&self) -> Result<Vec<String>, MuxError>;
}

/// Real adapter shelling out to `tmux`.
#[derive(Clone)]
pub struct TmuxAdapter {
    bin: PathBuf,
}

impl TmuxAdapter {
    /// Resolve the `tmux` binary once; later calls use the explicit path.
    pub fn resolve() -> Result<Self, MuxError> {
        let bin = which::which("tmux")
            .map_err(|_| MuxError::BinaryNotFound("tmux".to_string()))?;
        Ok(Self { bin })
    }

    pub fn with_binary(bin: PathBuf) -> Self {
        Self { bin }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, MuxError> {
        Ok(tokio::process::Command::new(&self.bin).args(args).output().await?)
    }

    async fn run_ok(&self, args: &[&str]) -> Result<String, MuxError> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(MuxError::CommandFailed(format!(
                "tmux {}: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Foreground command of each pane in the session.
    async fn pane_commands(&self, name: &str) -> Result<Vec<String>, MuxError> {
        let out = self
            .run_ok(&["list-panes", "-s", "-t", name, "-F", "#{pane_current_command}"])
            .await?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    /// Root process id of each pane in the session.
    async fn pane_pids(&self, name: &str) -> Result<Vec<i32>, MuxError> {
        let out = self.run_ok(&["list-panes", "-s", "-t", name, "-F", "#{pane_pid}"]).await?;
        Ok(out.lines().filter_map(|l| l.trim().parse().ok()).collect())
    }

    /// Seconds since epoch of the session's last window activity.
    async fn last_activity(&self, name: &str) -> Result<u64, MuxError> {
        let out = self
            .run_ok(&["display-message", "-p", "-t", name, "#{window_activity}"])
            .await?;
        out.trim()
            .parse()
            .map_err(|_| MuxError::CommandFailed(format!("bad window_activity for {name}")))
    }
}

fn is_shell(command: &str) -> bool {
    let base = command.rsplit('/').next().unwrap_or(command);
    SHELLS.contains(&base.trim_start_matches('-'))
}

fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[async_trait]
impl MultiplexerPort for TmuxAdapter {
    async fn has_session(&self, name: &str) -> Result<bool, MuxError> {
        let output = self.run(&["has-session", "-t", name]).await?;
        Ok(output.status.success())
    }

    async fn is_agent_alive(&self, name: &str) -> Result<bool, MuxError> {
        if !self.has_session(name).await? {
            return Ok(false);
        }
        let commands = self.pane_commands(name).await?;
        Ok(commands.iter().any(|c| !is_shell(c)))
    }

    async fn session_health(&self, name: &str) -> Result<SessionHealth, MuxError> {
        if !self.has_session(name).await? {
            return Ok(SessionHealth::Missing);
        }
        let commands = self.pane_commands(name).await?;
        if commands.iter().all(|c| is_shell(c)) {
            return Ok(SessionHealth::Zombie);
        }
        let activity = self.last_activity(name).await?;
        if epoch_secs().saturating_sub(activity) > HUNG_AFTER.as_secs() {
            return Ok(SessionHealth::Hung);
        }
        Ok(SessionHealth::Healthy)
    }

    async fn new_session(&self, name: &str, work_dir: &Path) -> Result<(), MuxError> {
        let dir = work_dir.display().to_string();
        self.run_ok(&["new-session", "-d", "-s", name, "-c", &dir]).await?;
        Ok(())
    }

    async fn ensure_session_fresh(&self, name: &str, work_dir: &Path) -> Result<(), MuxError> {
        if self.has_session(name).await? {
            self.kill_session(name).await?;
        }
        self.new_session(name, work_dir).await
    }

    async fn send_keys(&self, name: &str, command: &str) -> Result<(), MuxError> {
        self.run_ok(&["send-keys", "-t", name, command, "Enter"]).await?;
        Ok(())
    }

    async fn wait_for_command(
        &self,
        name: &str,
        shells: &[&str],
        timeout: Duration,
    ) -> Result<(), MuxError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let commands = self.pane_commands(name).await?;
            let ready = commands.iter().any(|c| {
                let base = c.rsplit('/').next().unwrap_or(c);
                !shells.contains(&base)
            });
            if ready {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(MuxError::Timeout {
                    session: name.to_string(),
                    what: "command start".to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn set_environment(&self, name: &str, key: &str, value: &str) -> Result<(), MuxError> {
        self.run_ok(&["set-environment", "-t", name, key, value]).await?;
        Ok(())
    }

    async fn set_option(&self, name: &str, key: &str, value: &str) -> Result<(), MuxError> {
        self.run_ok(&["set-option", "-t", name, key, value]).await?;
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        self.run_ok(&["kill-session", "-t", name]).await?;
        Ok(())
    }

    async fn kill_session_with_processes(&self, name: &str) -> Result<(), MuxError> {
        // Collect pane pids first; the session must still exist to ask.
        let pids = self.pane_pids(name).await.unwrap_or_default();
        for pid in pids {
            crate::proc::terminate_tree(pid, Duration::from_secs(2)).await;
        }
        // The session may already be gone once its panes died.
        if self.has_session(name).await? {
            self.kill_session(name).await?;
        }
        Ok(())
    }

    async fn nudge_session(&self, name: &str, message: &str) -> Result<(), MuxError> {
        self.run_ok(&["send-keys", "-t", name, "-l", message]).await?;
        self.run_ok(&["send-keys", "-t", name, "Enter"]).await?;
        Ok(())
    }

    async fn wait_for_idle(&self, name: &str, timeout: Duration) -> Result<bool, MuxError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let activity = self.last_activity(name).await?;
            if epoch_secs().saturating_sub(activity) >= 2 {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn set_pane_died_hook(&self, name: &str, id: &str) -> Result<(), MuxError> {
        let marker = format!("set-option -t {name} @pane_died {id}");
        self.run_ok(&["set-hook", "-t", name, "pane-died", &marker]).await?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>, MuxError> {
        let output = self.run(&["list-sessions", "-F", "#{session_name}"]).await?;
        if !output.status.success() {
            // tmux exits nonzero when no server is running; that means no sessions
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{MultiplexerPort, MuxError, SessionHealth};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    /// Recorded multiplexer call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MuxCall {
        NewSession { name: String },
        SendKeys { name: String, command: String },
        Kill { name: String },
        KillWithProcesses { name: String },
        Nudge { name: String, message: String },
        SetEnvironment { name: String, key: String, value: String },
        SetOption { name: String, key: String, value: String },
        PaneDiedHook { name: String, id: String },
    }

    #[derive(Debug, Clone)]
    struct FakeSession {
        work_dir: PathBuf,
        agent_alive: bool,
        health: SessionHealth,
        sent_keys: Vec<String>,
        env: Vec<(String, String)>,
        options: Vec<(String, String)>,
    }

    #[derive(Default)]
    struct FakeMuxState {
        sessions: HashMap<String, FakeSession>,
        calls: Vec<MuxCall>,
    }

    /// Fake multiplexer for tests: scriptable liveness, recorded calls.
    #[derive(Clone, Default)]
    pub struct FakeMux {
        inner: Arc<Mutex<FakeMuxState>>,
    }

    impl FakeMux {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script a pre-existing session.
        pub fn add_session(&self, name: &str, agent_alive: bool) {
            let health =
                if agent_alive { SessionHealth::Healthy } else { SessionHealth::Zombie };
            self.inner.lock().sessions.insert(
                name.to_string(),
                FakeSession {
                    work_dir: PathBuf::new(),
                    agent_alive,
                    health,
                    sent_keys: Vec::new(),
                    env: Vec::new(),
                    options: Vec::new(),
                },
            );
        }

        /// Override the health triage for a session.
        pub fn set_health(&self, name: &str, health: SessionHealth) {
            if let Some(session) = self.inner.lock().sessions.get_mut(name) {
                session.health = health;
                session.agent_alive = health == SessionHealth::Healthy;
            }
        }

        pub fn has(&self, name: &str) -> bool {
            self.inner.lock().sessions.contains_key(name)
        }

        pub fn sent_keys(&self, name: &str) -> Vec<String> {
            self.inner
                .lock()
                .sessions
                .get(name)
                .map(|s| s.sent_keys.clone())
                .unwrap_or_default()
        }

        pub fn env_of(&self, name: &str) -> Vec<(String, String)> {
            self.inner.lock().sessions.get(name).map(|s| s.env.clone()).unwrap_or_default()
        }

        pub fn options_of(&self, name: &str) -> Vec<(String, String)> {
            self.inner.lock().sessions.get(name).map(|s| s.options.clone()).unwrap_or_default()
        }

        pub fn work_dir_of(&self, name: &str) -> Option<PathBuf> {
            self.inner.lock().sessions.get(name).map(|s| s.work_dir.clone())
        }

        pub fn calls(&self) -> Vec<MuxCall> {
            self.inner.lock().calls.clone()
        }

        pub fn kill_count(&self, name: &str) -> usize {
            self.inner
                .lock()
                .calls
                .iter()
                .filter(|c| {
                    matches!(c, MuxCall::Kill { name: n } | MuxCall::KillWithProcesses { name: n } if n == name)
                })
                .count()
        }
    }

    #[async_trait]
    impl MultiplexerPort for FakeMux {
        async fn has_session(&self, name: &str) -> Result<bool, MuxError> {
            Ok(self.inner.lock().sessions.contains_key(name))
        }

        async fn is_agent_alive(&self, name: &str) -> Result<bool, MuxError> {
            Ok(self.inner.lock().sessions.get(name).map(|s| s.agent_alive).unwrap_or(false))
        }

        async fn session_health(&self, name: &str) -> Result<SessionHealth, MuxError> {
            Ok(self
                .inner
                .lock()
                .sessions
                .get(name)
                .map(|s| s.health)
                .unwrap_or(SessionHealth::Missing))
        }

        async fn new_session(&self, name: &str, work_dir: &Path) -> Result<(), MuxError> {
            let mut state = self.inner.lock();
            state.calls.push(MuxCall::NewSession { name: name.to_string() });
            state.sessions.insert(
                name.to_string(),
                FakeSession {
                    work_dir: work_dir.to_path_buf(),
                    agent_alive: true,
                    health: SessionHealth::Healthy,
                    sent_keys: Vec::new(),
                    env: Vec::new(),
                    options: Vec::new(),
                },
            );
            Ok(())
        }

        async fn ensure_session_fresh(&self, name: &str, work_dir: &Path) -> Result<(), MuxError> {
            {
                let mut state = self.inner.lock();
                if state.sessions.remove(name).is_some() {
                    state.calls.push(MuxCall::Kill { name: name.to_string() });
                }
            }
            self.new_session(name, work_dir).await
        }

        async fn send_keys(&self, name: &str, command: &str) -> Result<(), MuxError> {
            let mut state = self.inner.lock();
            state
                .calls
                .push(MuxCall::SendKeys { name: name.to_string(), command: command.to_string() });
            match state.sessions.get_mut(name) {
                Some(session) => {
                    session.sent_keys.push(command.to_string());
                    Ok(())
                }
                None => Err(MuxError::SessionNotFound(name.to_string())),
            }
        }

        async fn wait_for_command(
            &self,
            name: &str,
            _shells: &[&str],
            _timeout: Duration,
        ) -> Result<(), MuxError> {
            if self.inner.lock().sessions.contains_key(name) {
                Ok(())
            } else {
                Err(MuxError::SessionNotFound(name.to_string()))
            }
        }

        async fn set_environment(
            &self,
            name: &str,
            key: &str,
            value: &str,
        ) -> Result<(), MuxError> {
            let mut state = self.inner.lock();
            state.calls.push(MuxCall::SetEnvironment {
                name: name.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            });
            match state.sessions.get_mut(name) {
                Some(session) => {
                    session.env.push((key.to_string(), value.to_string()));
                    Ok(())
                }
                None => Err(MuxError::SessionNotFound(name.to_string())),
            }
        }

        async fn set_option(&self, name: &str, key: &str, value: &str) -> Result<(), MuxError> {
            let mut state = self.inner.lock();
            state.calls.push(MuxCall::SetOption {
                name: name.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            });
            match state.sessions.get_mut(name) {
                Some(session) => {
                    session.options.push((key.to_string(), value.to_string()));
                    Ok(())
                }
                None => Err(MuxError::SessionNotFound(name.to_string())),
            }
        }

        async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
            let mut state = self.inner.lock();
            state.calls.push(MuxCall::Kill { name: name.to_string() });
            state.sessions.remove(name);
            Ok(())
        }

        async fn kill_session_with_processes(&self, name: &str) -> Result<(), MuxError> {
            let mut state = self.inner.lock();
            state.calls.push(MuxCall::KillWithProcesses { name: name.to_string() });
            state.sessions.remove(name);
            Ok(())
        }

        async fn nudge_session(&self, name: &str, message: &str) -> Result<(), MuxError> {
            let mut state = self.inner.lock();
            state
                .calls
                .push(MuxCall::Nudge { name: name.to_string(), message: message.to_string() });
            Ok(())
        }

        async fn wait_for_idle(&self, _name: &str, _timeout: Duration) -> Result<bool, MuxError> {
            Ok(true)
        }

        async fn set_pane_died_hook(&self, name: &str, id: &str) -> Result<(), MuxError> {
            self.inner
                .lock()
                .calls
                .push(MuxCall::PaneDiedHook { name: name.to_string(), id: id.to_string() });
            Ok(())
        }

        async fn list_sessions(&self) -> Result<Vec<String>, MuxError> {
            Ok(self.inner.lock().sessions.keys().cloned().collect())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeMux, MuxCall};

#[cfg(test)]
#[path = "mux_tests.rs"]
mod tests;
