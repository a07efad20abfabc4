//! Centralised tracing initialisation for Ava binaries.
//!
//! Call [`init_tracing`] once at program start. Console output goes to
//! stderr, plain or JSON, leaving stdout to command output. When a log
//! directory is configured every event is also written, without ANSI
//! colours, to `<log_dir>/ava_<YYYYMMDD_HHMMSS>.log`.
//!
//! `RUST_LOG` takes precedence over the configured level.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{Dispatch, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// What to log and where.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    pub level: Level,
    /// Emit newline-delimited JSON on the console.
    pub json: bool,
    /// Also write to a timestamped file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            log_dir: None,
        }
    }
}

/// Parse a level name, falling back to `INFO` for anything unknown.
pub fn parse_level(raw: &str) -> Level {
    raw.trim().parse().unwrap_or(Level::INFO)
}

/// File name for a log started at `at`.
pub fn log_file_name(at: DateTime<Utc>) -> String {
    format!("ava_{}.log", at.format("%Y%m%d_%H%M%S"))
}

/// Build a dispatcher without installing it.
///
/// Returns the path of the log file when one was opened.
pub fn build_dispatch(options: &LoggingOptions) -> io::Result<(Dispatch, Option<PathBuf>)> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.level.as_str()));

    let (file_layer, log_path) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(log_file_name(Utc::now()));
            let file: File = OpenOptions::new().create(true).append(true).open(&path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(Arc::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    let (json_layer, plain_layer) = if options.json {
        (Some(fmt::layer().json().with_writer(io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(io::stderr)))
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer);

    Ok((Dispatch::new(subscriber), log_path))
}

/// Install the global subscriber.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_tracing(options: &LoggingOptions) -> io::Result<Option<PathBuf>> {
    let (dispatch, log_path) = build_dispatch(options)?;
    if tracing::dispatcher::set_global_default(dispatch).is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_log_file_name() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(log_file_name(at), "ava_20250304_050607.log");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("nonsense"), Level::INFO);
    }

    #[test]
    fn test_console_only_has_no_file() {
        let (_dispatch, path) = build_dispatch(&LoggingOptions::default()).unwrap();
        assert!(path.is_none());
    }

    #[test]
    fn test_file_logging_writes_events() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let options = LoggingOptions {
            level: Level::DEBUG,
            json: false,
            log_dir: Some(log_dir.clone()),
        };

        let (dispatch, path) = build_dispatch(&options).unwrap();
        let path = path.unwrap();
        assert!(log_dir.exists());

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(target: "ava_core::test_format", "Test formatting");
        });

        let files: Vec<_> = std::fs::read_dir(&log_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.starts_with("ava_") && name.ends_with(".log")
            })
            .collect();
        assert_eq!(files.len(), 1);

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("INFO"));
        assert!(content.contains("test_format"));
        assert!(content.contains("Test formatting"));
    }
}
