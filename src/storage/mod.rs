//! Persistence layer.
//!
//! Writes each finished cycle's state as a pretty-printed JSON trace under
//! the trace directory, one file per cycle, and reads them back for
//! inspection or replay.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::state::TradingState;

/// Trace file location for a cycle: `<dir>/<symbol>_<cycle_id>.json`.
pub fn trace_path(dir: &Path, state: &TradingState) -> PathBuf {
    dir.join(format!("{}_{}.json", state.symbol, state.cycle_id))
}

/// Save a cycle trace, creating the directory if needed.
pub fn save_trace(state: &TradingState, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create trace dir {}", dir.display()))?;

    let path = trace_path(dir, state);
    let json = serde_json::to_string_pretty(state).context("Failed to serialise cycle state")?;
    std::fs::write(&path, &json)
        .with_context(|| format!("Failed to write trace to {}", path.display()))?;

    debug!(
        path = %path.display(),
        cycle_id = %state.cycle_id,
        step = %state.current_step,
        "Trace saved"
    );
    Ok(path)
}

/// Load a cycle trace.
/// Returns None if the file doesn't exist.
pub fn load_trace(path: &Path) -> Result<Option<TradingState>> {
    if !path.exists() {
        info!(path = %path.display(), "No trace found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace from {}", path.display()))?;
    let state: TradingState = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse trace from {}", path.display()))?;

    Ok(Some(state))
}

/// Delete a trace file. Missing files are not an error.
pub fn delete_trace(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete trace {}", path.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
