// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-pool patrol: top-up and health (steps 4 and 5).
//!
//! Dogs are the deacon's pooled workers. Each lives under
//! `deacon/dogs/<name>/` with a `.dog.json` state file written by the
//! worker itself.

use crate::daemon::Daemon;
use chrono::{DateTime, Utc};
use gt_adapters::{IssueTrackerPort, MailPort, MultiplexerPort};
use gt_core::Clock;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Pool floor: spawn replacements below this many idle dogs.
const MIN_IDLE_DOGS: usize = 1;
/// A working dog silent for this long draws a warning (never a kill).
const DOG_STALL: Duration = Duration::from_secs(2 * 3600);

/// One worker's `.dog.json`.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DogRecord {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    pub work: Option<String>,
}

impl<M, T, P, C> Daemon<M, T, P, C>
where
    M: MultiplexerPort,
    T: IssueTrackerPort,
    P: MailPort,
    C: Clock,
{
    pub(crate) fn scan_dogs(&self) -> Vec<(String, DogRecord)> {
        let Ok(entries) = std::fs::read_dir(self.paths.dogs_dir()) else { return Vec::new() };
        let mut dogs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path().join(".dog.json");
            let Ok(content) = std::fs::read_to_string(&path) else { continue };
            let Ok(record) = serde_json::from_str::<DogRecord>(&content) else {
                warn!(path = %path.display(), "unparseable dog record");
                continue;
            };
            dogs.push((entry.file_name().to_string_lossy().to_string(), record));
        }
        dogs
    }

    pub(crate) fn count_idle_dogs(&self) -> usize {
        self.scan_dogs().iter().filter(|(_, dog)| dog.state == "idle").count()
    }

    /// Step 4: keep at least the floor of idle dogs available. A town
    /// without a pool directory has no pool to top up.
    pub(crate) async fn top_up_dog_pool(&self) {
        if !self.paths.dogs_dir().is_dir() {
            return;
        }
        let idle = self.count_idle_dogs();
        if idle >= MIN_IDLE_DOGS {
            return;
        }
        let needed = MIN_IDLE_DOGS - idle;
        for _ in 0..needed {
            let name = format!("dog-{}", self.clock.utc_now().format("%Y%m%d%H%M%S%3f"));
            match self.tracker.spawn_dog(&self.paths.root, &name).await {
                Ok(()) => info!(dog = %name, "spawned replacement worker"),
                Err(e) => warn!(dog = %name, error = %e, "worker spawn failed"),
            }
        }
    }

    /// Step 5: warn about stalled working dogs; never kill them.
    pub(crate) async fn check_dog_health(&self) {
        let now = self.clock.utc_now();
        for (name, dog) in self.scan_dogs() {
            if dog.state != "working" {
                continue;
            }
            let Some(last_active) = dog.last_active else { continue };
            let stalled = (now - last_active).to_std().unwrap_or(Duration::ZERO);
            if stalled > DOG_STALL {
                warn!(
                    dog = %name,
                    work = dog.work.as_deref().unwrap_or(""),
                    stalled_secs = stalled.as_secs(),
                    "working dog has been silent for over two hours"
                );
            }
        }
    }
}
