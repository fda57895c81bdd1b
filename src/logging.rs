//! Tracing setup for the orchestrator binary.
//!
//! Human-readable output goes to stderr. When a log directory is given, a
//! JSON copy of every record goes to `orchestrator.jsonl.<date>` inside it,
//! rotated daily and written off the calling thread. The filter comes from
//! `ORCHESTRATOR_LOG` (default `info`).

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOG_ENV: &str = "ORCHESTRATOR_LOG";
/// Prefix of the rotated JSON log files.
pub const LOG_FILE_PREFIX: &str = "orchestrator.jsonl";
const DEFAULT_FILTER: &str = "info";

static INITIALIZED: OnceLock<()> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber once.
///
/// Returns the guard of the background file writer; buffered records are
/// flushed when it is dropped, so keep it alive until exit. Later calls are
/// no-ops returning `None`. An already-installed global subscriber (for
/// example from a test harness) is left in place.
pub fn init(logs_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    if INITIALIZED.get().is_some() {
        return Ok(None);
    }

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter());

    let (file_layer, guard) = match logs_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already installed");
    }

    INITIALIZED.get_or_init(|| ());
    if let Some(dir) = logs_dir {
        tracing::debug!(log_dir = %dir.display(), "Logging initialized");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_rotated_json_log_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let logs = dir.path().join("logs");

        let guard = init(Some(&logs)).expect("init");
        assert!(guard.is_some());
        assert!(init(Some(&logs)).expect("second init").is_none());

        tracing::info!("log line for the file writer");
        drop(guard);

        let names: Vec<String> = std::fs::read_dir(&logs)
            .expect("read log dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(
            names.iter().any(|name| name.starts_with(LOG_FILE_PREFIX)),
            "no rotated log file in {names:?}"
        );
    }
}
