// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process table access.
//!
//! Liveness probes, command-line lookup (to defeat PID reuse), and
//! terminate-then-kill for whole process trees. Uses the portable `ps`
//! surface for enumeration and `nix` signals for delivery.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::Duration;

/// One row of the process table.
#[derive(Debug, Clone)]
pub struct ProcessEntry {
    pub pid: i32,
    pub ppid: i32,
    /// Controlling terminal; `?` means none.
    pub tty: String,
    pub elapsed: Duration,
    pub command: String,
}

impl ProcessEntry {
    /// Whether the process has no controlling terminal.
    pub fn detached(&self) -> bool {
        self.tty == "?"
    }
}

/// Probe liveness with a zero signal.
pub fn pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Send SIGTERM; errors (already gone) are ignored.
pub fn send_term(pid: i32) {
    if pid > 0 {
        let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
    }
}

/// Send SIGKILL; errors (already gone) are ignored.
pub fn send_kill(pid: i32) {
    if pid > 0 {
        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
    }
}

/// Command line of a process, or None if it is gone.
pub async fn process_command(pid: i32) -> Option<String> {
    let output = tokio::process::Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "args="])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let command = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if command.is_empty() {
        None
    } else {
        Some(command)
    }
}

/// Snapshot of the full process table.
pub async fn list_processes() -> std::io::Result<Vec<ProcessEntry>> {
    let output = tokio::process::Command::new("ps")
        .args(["-eo", "pid=,ppid=,tty=,etimes=,args="])
        .output()
        .await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().filter_map(parse_ps_line).collect())
}

fn parse_ps_line(line: &str) -> Option<ProcessEntry> {
    let mut parts = line.split_whitespace();
    let pid: i32 = parts.next()?.parse().ok()?;
    let ppid: i32 = parts.next()?.parse().ok()?;
    let tty = parts.next()?.to_string();
    let elapsed = Duration::from_secs(parts.next()?.parse().ok()?);
    let command = parts.collect::<Vec<_>>().join(" ");
    if command.is_empty() {
        return None;
    }
    Some(ProcessEntry { pid, ppid, tty, elapsed, command })
}

/// All transitive children of `root`, deepest last.
pub async fn descendants(root: i32) -> Vec<i32> {
    let Ok(table) = list_processes().await else {
        return Vec::new();
    };
    let mut found = Vec::new();
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for entry in &table {
            if entry.ppid == parent && !found.contains(&entry.pid) {
                found.push(entry.pid);
                frontier.push(entry.pid);
            }
        }
    }
    found
}

/// Terminate a process and all its descendants: TERM, a grace period
/// polling for exit, then KILL for the survivors.
pub async fn terminate_tree(root: i32, grace: Duration) {
    let mut targets = descendants(root).await;
    targets.push(root);

    for pid in &targets {
        send_term(*pid);
    }

    let deadline = tokio::time::Instant::now() + grace;
    loop {
        if !targets.iter().any(|pid| pid_alive(*pid)) {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for pid in &targets {
        if pid_alive(*pid) {
            tracing::debug!(pid, "process survived SIGTERM grace, sending SIGKILL");
            send_kill(*pid);
        }
    }
}

#[cfg(test)]
#[path = "proc_tests.rs"]
mod tests;
