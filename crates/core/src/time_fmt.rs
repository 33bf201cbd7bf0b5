// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable elapsed time for status surfaces.

/// Format elapsed seconds compactly: "42s", "3m12s", "2h05m", "4d07h".
pub fn format_elapsed(secs: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if secs < MINUTE {
        format!("{secs}s")
    } else if secs < HOUR {
        format!("{}m{:02}s", secs / MINUTE, secs % MINUTE)
    } else if secs < DAY {
        format!("{}h{:02}m", secs / HOUR, (secs % HOUR) / MINUTE)
    } else {
        format!("{}d{:02}h", secs / DAY, (secs % DAY) / HOUR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        zero      = { 0,        "0s" },
        seconds   = { 42,       "42s" },
        minutes   = { 192,      "3m12s" },
        hours     = { 7500,     "2h05m" },
        days      = { 371_000,  "4d07h" },
        exact_min = { 60,       "1m00s" },
    )]
    fn formats(secs: u64, expected: &str) {
        assert_eq!(format_elapsed(secs), expected);
    }
}
