//! Logging initialization for attesta.
//!
//! Logs go to stderr unless `logging.dir` is set, in which case they are
//! written to `{dir}/attesta-{datetime}.log` through a non-blocking writer.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Result of logging initialization
pub struct LoggingHandle {
    /// Guard that must be kept alive for the duration of the program.
    /// When dropped, ensures all buffered logs are flushed.
    pub _guard: Option<WorkerGuard>,

    /// Path to the log file (only set with file logging enabled)
    pub log_file_path: Option<PathBuf>,
}

/// Effective filter directive: `--debug` wins over the configured level
fn level_directive(config: &Config, debug_override: bool) -> String {
    if debug_override {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    }
}

fn log_filename(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("attesta-{}.log", now.format("%Y%m%dT%H%M%SZ"))
}

/// Initialize logging based on configuration.
///
/// # Returns
/// A `LoggingHandle` that must be kept alive for the duration of the program.
pub fn init_logging(config: &Config, debug_override: bool) -> Result<LoggingHandle> {
    let log_level = level_directive(config, debug_override);
    let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or(log_level));

    if let Some(logs_dir) = config.logs_path() {
        std::fs::create_dir_all(&logs_dir)?;
        let filename = log_filename(chrono::Utc::now());
        let (non_blocking, guard, log_file_path) = file_writer(&logs_dir, &filename);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false) // No ANSI codes in log files
                    .with_writer(non_blocking),
            )
            .init();

        Ok(LoggingHandle {
            _guard: Some(guard),
            log_file_path: Some(log_file_path),
        })
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();

        Ok(LoggingHandle {
            _guard: None,
            log_file_path: None,
        })
    }
}

fn file_writer(
    logs_dir: &Path,
    filename: &str,
) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard, PathBuf) {
    let file_appender = tracing_appender::rolling::never(logs_dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    (non_blocking, guard, logs_dir.join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_debug_override_wins() {
        let mut config = Config::default();
        config.logging.level = "warn".to_string();
        assert_eq!(level_directive(&config, true), "debug");
        assert_eq!(level_directive(&config, false), "warn");
    }

    #[test]
    fn test_log_filename_format() {
        let at = chrono::Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(log_filename(at), "attesta-20260304T050607Z.log");
    }

    #[test]
    fn test_logs_path_disabled_by_default() {
        assert!(Config::default().logs_path().is_none());
    }

    #[test]
    fn test_file_writer_targets_logs_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let (_writer, _guard, path) = file_writer(temp_dir.path(), "attesta-test.log");
        assert!(path.starts_with(temp_dir.path()));
        assert!(path.to_string_lossy().ends_with("attesta-test.log"));
    }
}
