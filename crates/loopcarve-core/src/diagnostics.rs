use std::{fs, path::Path};

use anyhow::Context;
use chrono::Utc;
use tracing::{Span, info, info_span, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

pub const DEFAULT_LOG_FILTER: &str = "info,loopcarve_core=debug";
pub const DEFAULT_FILE_PREFIX: &str = "loopcarve";

/// Keeps the file writer flushing until dropped.
pub struct TelemetryGuard {
    pub session_id: Uuid,
    _file_guard: WorkerGuard,
}

impl TelemetryGuard {
    /// Root span for a CLI run; every event logged inside it carries the
    /// session id in the JSON file.
    #[must_use]
    pub fn session_span(&self) -> Span {
        info_span!("loopcarve", session_id = %self.session_id)
    }
}

pub fn init_tracing(log_dir: impl AsRef<Path>) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(log_dir, DEFAULT_FILE_PREFIX, DEFAULT_LOG_FILTER)
}

/// `RUST_LOG` takes precedence over `default_filter`.
pub fn init_tracing_with_options(
    log_dir: impl AsRef<Path>,
    file_prefix: &str,
    default_filter: &str,
) -> anyhow::Result<TelemetryGuard> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let session_id = Uuid::new_v4();
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let file_name = format!("{file_prefix}-{timestamp}.log");
    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_thread_ids(true)
        .with_target(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(file_writer);

    if let Err(error) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        warn!(?error, "global tracing subscriber already initialized");
    } else {
        info!(%session_id, "tracing initialized");
    }

    Ok(TelemetryGuard {
        session_id,
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_tagged_with_the_session_id() {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let log_dir = temp.path().join("nested/logs");
        let guard = init_tracing_with_options(&log_dir, "unit", DEFAULT_LOG_FILTER)
            .expect("tracing should initialise");
        let session_id = guard.session_id.to_string();
        guard.session_span().in_scope(|| info!("inside session"));
        drop(guard);

        let names: Vec<String> = fs::read_dir(&log_dir)
            .expect("log dir should exist")
            .map(|entry| {
                entry
                    .expect("entry should be readable")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("unit-"));
        assert!(names[0].ends_with(".log"));

        let contents =
            fs::read_to_string(log_dir.join(&names[0])).expect("log file should be readable");
        let tagged = contents
            .lines()
            .find(|line| line.contains("inside session"))
            .expect("event should reach the file layer");
        assert!(tagged.contains(&session_id));
    }
}
