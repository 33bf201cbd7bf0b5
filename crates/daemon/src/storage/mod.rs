// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk daemon records: state file, restart tracker, dedup table.

pub mod restart;
pub mod state;

use serde::Serialize;
use std::path::Path;

/// Write a JSON document atomically: write a sibling temp file, then rename
/// over the target. Readers never observe a torn write.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
