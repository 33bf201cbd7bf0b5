// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent restart tracking: exponential backoff and crash-loop freeze.
//!
//! Backoff bounds the restart rate of a flapping agent; the stability
//! window lets an intermittently crashing agent return to instant restart;
//! a crash loop freezes restarts entirely until an operator clears it.

use crate::storage::write_json_atomic;
use chrono::{DateTime, Utc};
use gt_core::Clock;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Backoff and crash-loop parameters.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub crash_loop_window: Duration,
    pub crash_loop_count: u32,
    /// Quiet period after which counters reset.
    pub stability: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(30),
            max: Duration::from_secs(10 * 60),
            multiplier: 2.0,
            crash_loop_window: Duration::from_secs(15 * 60),
            crash_loop_count: 5,
            stability: Duration::from_secs(30 * 60),
        }
    }
}

impl RestartPolicy {
    /// Backoff delay after the nth consecutive restart (1-based).
    fn delay_after(&self, count: u32) -> Duration {
        let exp = count.saturating_sub(1).min(63);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exp as i32);
        if secs >= self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// One agent's restart record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestartRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_restart: Option<DateTime<Utc>>,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_until: Option<DateTime<Utc>>,
    /// Non-empty means restart is frozen until explicitly cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crash_loop_since: Option<DateTime<Utc>>,
    /// Recent restart times, pruned to the crash-loop count.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_restarts: Vec<DateTime<Utc>>,
}

impl RestartRecord {
    fn reset(&mut self) {
        *self = RestartRecord::default();
    }
}

/// What a recorded restart did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartOutcome {
    pub restart_count: u32,
    pub backoff: Duration,
    /// True only on the restart that newly entered the crash loop.
    pub entered_crash_loop: bool,
}

/// Mutex-protected tracker persisted as a JSON snapshot.
pub struct RestartTracker<C: Clock> {
    path: PathBuf,
    policy: RestartPolicy,
    clock: C,
    records: Mutex<HashMap<String, RestartRecord>>,
}

impl<C: Clock> RestartTracker<C> {
    /// Load the snapshot (absence reads as empty) with the default policy.
    pub fn load(path: PathBuf, clock: C) -> std::io::Result<Self> {
        Self::load_with_policy(path, RestartPolicy::default(), clock)
    }

    pub fn load_with_policy(
        path: PathBuf,
        policy: RestartPolicy,
        clock: C,
    ) -> std::io::Result<Self> {
        let records = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };
        Ok(Self { path, policy, clock, records: Mutex::new(records) })
    }

    /// `!crash_loop && now >= backoff_until`.
    pub fn can_restart(&self, id: &str) -> bool {
        let records = self.records.lock();
        let Some(record) = records.get(id) else { return true };
        if record.crash_loop_since.is_some() {
            return false;
        }
        match record.backoff_until {
            Some(until) => self.clock.utc_now() >= until,
            None => true,
        }
    }

    pub fn in_crash_loop(&self, id: &str) -> bool {
        self.records.lock().get(id).map(|r| r.crash_loop_since.is_some()).unwrap_or(false)
    }

    /// Time left before the next restart is allowed, if any.
    pub fn backoff_remaining(&self, id: &str) -> Option<Duration> {
        let records = self.records.lock();
        let until = records.get(id)?.backoff_until?;
        (until - self.clock.utc_now()).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Record that a restart happened now.
    pub fn record_restart(&self, id: &str) -> std::io::Result<RestartOutcome> {
        let now = self.clock.utc_now();
        let outcome = {
            let mut records = self.records.lock();
            let record = records.entry(id.to_string()).or_default();

            // A long quiet stretch wipes the slate before counting.
            if let Some(last) = record.last_restart {
                if age(now, last) > self.policy.stability {
                    record.reset();
                }
            }

            record.restart_count += 1;
            record.last_restart = Some(now);
            let backoff = self.policy.delay_after(record.restart_count);
            record.backoff_until = now.checked_add_signed(
                chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero()),
            );

            record.recent_restarts.push(now);
            let keep = self.policy.crash_loop_count as usize;
            if record.recent_restarts.len() > keep {
                let drop = record.recent_restarts.len() - keep;
                record.recent_restarts.drain(..drop);
            }

            let mut entered_crash_loop = false;
            if record.crash_loop_since.is_none()
                && record.recent_restarts.len() >= keep
                && record
                    .recent_restarts
                    .first()
                    .map(|first| age(now, *first) <= self.policy.crash_loop_window)
                    .unwrap_or(false)
            {
                record.crash_loop_since = Some(now);
                entered_crash_loop = true;
            }

            RestartOutcome { restart_count: record.restart_count, backoff, entered_crash_loop }
        };
        self.save()?;
        Ok(outcome)
    }

    /// Record that the agent was observed healthy.
    pub fn record_success(&self, id: &str) -> std::io::Result<()> {
        let now = self.clock.utc_now();
        let mut changed = false;
        {
            let mut records = self.records.lock();
            if let Some(record) = records.get_mut(id) {
                let stable = match record.last_restart {
                    Some(last) => age(now, last) > self.policy.stability,
                    None => true,
                };
                if stable && *record != RestartRecord::default() {
                    record.reset();
                    changed = true;
                }
            }
        }
        if changed {
            self.save()?;
        }
        Ok(())
    }

    /// Manual intervention: zero counters and backoff.
    pub fn clear_crash_loop(&self, id: &str) -> std::io::Result<()> {
        {
            let mut records = self.records.lock();
            if let Some(record) = records.get_mut(id) {
                record.reset();
            }
        }
        self.save()
    }

    pub fn record(&self, id: &str) -> Option<RestartRecord> {
        self.records.lock().get(id).cloned()
    }

    /// Agents currently frozen in a crash loop.
    pub fn crash_looped(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|(_, r)| r.crash_loop_since.is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn save(&self) -> std::io::Result<()> {
        let records = self.records.lock();
        write_json_atomic(&self.path, &*records)
    }
}

fn age(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
#[path = "restart_tests.rs"]
mod tests;
