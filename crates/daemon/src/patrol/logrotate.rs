// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon log rotation (step 8).
//!
//! `.log → .log.1 → .log.2 → .log.3`, dropping anything older. The live
//! log is copied then truncated rather than renamed because the tracing
//! appender keeps its file descriptor open.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Generations kept besides the live log.
const KEEP_GENERATIONS: u32 = 3;

fn generation(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Rotate if the live log exceeds `max_size` bytes.
pub(crate) fn rotate_if_larger(path: &Path, max_size: u64) {
    let Ok(metadata) = std::fs::metadata(path) else { return };
    if metadata.len() <= max_size {
        return;
    }
    if let Err(e) = rotate(path) {
        warn!(path = %path.display(), error = %e, "log rotation failed");
    }
}

/// Rotate at daemon startup, before the appender opens the file.
pub fn rotate_log_if_needed(path: &Path, max_size: u64) {
    rotate_if_larger(path, max_size);
}

fn rotate(path: &Path) -> std::io::Result<()> {
    // Oldest generation beyond the cap is dropped.
    let _ = std::fs::remove_file(generation(path, KEEP_GENERATIONS + 1));
    let mut n = KEEP_GENERATIONS;
    while n >= 2 {
        let src = generation(path, n - 1);
        if src.exists() {
            std::fs::rename(&src, generation(path, n))?;
        }
        n -= 1;
    }
    // Copy then truncate: the appender's open descriptor keeps writing to
    // the (now empty) live file.
    std::fs::copy(path, generation(path, 1))?;
    std::fs::OpenOptions::new().write(true).truncate(true).open(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn small_logs_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("daemon.log");
        write(&log, "short");
        rotate_if_larger(&log, 1024);
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "short");
        assert!(!generation(&log, 1).exists());
    }

    #[test]
    fn oversized_log_rotates_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("daemon.log");
        write(&log, "0123456789");
        rotate_if_larger(&log, 5);

        assert_eq!(std::fs::read_to_string(&log).unwrap(), "");
        assert_eq!(std::fs::read_to_string(generation(&log, 1)).unwrap(), "0123456789");
    }

    #[test]
    fn generations_shift_and_the_oldest_drops() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("daemon.log");
        write(&log, "current-content");
        write(&generation(&log, 1), "gen1");
        write(&generation(&log, 2), "gen2");
        write(&generation(&log, 3), "gen3");

        rotate_if_larger(&log, 5);

        assert_eq!(std::fs::read_to_string(generation(&log, 1)).unwrap(), "current-content");
        assert_eq!(std::fs::read_to_string(generation(&log, 2)).unwrap(), "gen1");
        assert_eq!(std::fs::read_to_string(generation(&log, 3)).unwrap(), "gen2");
        // gen3 fell off the end
        assert!(!generation(&log, 4).exists());
    }

    #[test]
    fn missing_log_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        rotate_if_larger(&dir.path().join("absent.log"), 5);
    }
}
