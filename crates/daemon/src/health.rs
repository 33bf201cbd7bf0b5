// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consecutive health-failure counting per agent.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Failures in a row before the tracker reports threshold crossing.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// In-memory consecutive-failure counter. Resets on success; reports the
/// exact crossing of the threshold so callers escalate once, not on every
/// failure past it.
pub struct HealthFailureTracker {
    threshold: u32,
    counts: Mutex<HashMap<String, u32>>,
}

impl Default for HealthFailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl HealthFailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self { threshold, counts: Mutex::new(HashMap::new()) }
    }

    /// Record a failure; returns the new consecutive count.
    pub fn record_failure(&self, id: &str) -> u32 {
        let mut counts = self.counts.lock();
        let count = counts.entry(id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Whether this failure is the one that crossed the threshold.
    pub fn just_crossed(&self, count: u32) -> bool {
        count == self.threshold
    }

    pub fn record_success(&self, id: &str) {
        self.counts.lock().remove(id);
    }

    pub fn failures(&self, id: &str) -> u32 {
        self.counts.lock().get(id).copied().unwrap_or(0)
    }
}
