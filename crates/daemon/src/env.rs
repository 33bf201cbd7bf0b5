// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Daemon version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve the town root: GT_TOWN_ROOT > ~/gt.
pub fn town_root() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("GT_TOWN_ROOT") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoTownRoot)?;
    Ok(home.join("gt"))
}

/// Agent runtime command started inside every session (GT_RUNTIME override).
pub fn runtime_command() -> String {
    std::env::var("GT_RUNTIME").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| {
        "claude".to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn town_root_prefers_env() {
        std::env::set_var("GT_TOWN_ROOT", "/var/town");
        assert_eq!(town_root().unwrap(), PathBuf::from("/var/town"));
        std::env::remove_var("GT_TOWN_ROOT");
    }

    #[test]
    #[serial]
    fn town_root_falls_back_to_home() {
        std::env::remove_var("GT_TOWN_ROOT");
        // HOME may be absent in minimal environments; only the happy path
        // has a defined shape.
        if let Ok(root) = town_root() {
            assert!(root.ends_with("gt"));
        }
    }

    #[test]
    #[serial]
    fn runtime_command_defaults_to_claude() {
        std::env::remove_var("GT_RUNTIME");
        assert_eq!(runtime_command(), "claude");
        std::env::set_var("GT_RUNTIME", "claude --continue");
        assert_eq!(runtime_command(), "claude --continue");
        std::env::remove_var("GT_RUNTIME");
    }
}
