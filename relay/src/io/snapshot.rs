//! JSON snapshots of a session's history.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::history::HistoryStore;

/// Everything a session recorded, as written by `relay run --history-out`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub session_id: String,
    /// Round index when the session ended (equals rounds completed unless
    /// the evaluator terminated or a stage failed mid-round).
    pub round: u32,
    /// Terminal state, e.g. `exhausted` or `failed`.
    pub state: String,
    pub history: HistoryStore,
}

/// Write `snapshot` as pretty JSON with a trailing newline.
pub fn write_snapshot(path: &Path, snapshot: &HistorySnapshot) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create snapshot dir {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(snapshot).context("serialize history snapshot")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

pub fn load_snapshot(path: &Path) -> Result<HistorySnapshot> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
