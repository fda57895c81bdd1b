//! Storage locations for orchestrator persistence.
//!
//! Everything lives under one data directory, `~/.worktree-orchestrator/` by
//! default (override with `ORCHESTRATOR_HOME`):
//! - `orchestrator.yaml` - configuration
//! - `workflows/<id>.json` - workflow records
//! - `events.jsonl` - persisted lifecycle events
//! - `checkpoints/<id>.json` - pipeline checkpoints
//! - `logs/` - JSON log files
//! - `orchestrator.lock` - single-instance lock

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const ORCHESTRATOR_DIR: &str = ".worktree-orchestrator";

pub const HOME_ENV: &str = "ORCHESTRATOR_HOME";

/// Returns the default data directory, creating it if needed.
pub fn orchestrator_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => dirs::home_dir()
            .context("Could not determine home directory for orchestrator storage")?
            .join(ORCHESTRATOR_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
    Ok(dir)
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("orchestrator.yaml")
}

pub fn workflows_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("workflows")
}

pub fn checkpoints_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("checkpoints")
}

pub fn events_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("events.jsonl")
}

/// Returns `<data_dir>/logs/`, creating it if needed.
pub fn logs_dir(data_dir: &Path) -> Result<PathBuf> {
    let dir = data_dir.join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Serializes `value` as pretty JSON and swaps it into place via temp file + rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

/// Exclusive lock on a data directory, held for the life of the process.
///
/// Two orchestrators sharing a data dir would each believe they own every
/// worktree, so the second one refuses to start.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        let path = data_dir.join("orchestrator.lock");
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .context("Failed to open lock file")?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => anyhow::bail!(
                "Another orchestrator is already using {}",
                data_dir.display()
            ),
            Err(e) => Err(e).context("Failed to acquire lock"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
