//! Structured logging setup with console and file output.
//!
//! - Interactive terminals get console output only
//! - Otherwise logs go to stderr and a daily rotating file, falling back to the
//!   console alone when the log directory is unusable
//! - `PGSOLO_LOG` or `RUST_LOG` override the build-type default filter

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "PGSOLO_LOG";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether stdout is a terminal
    pub is_tty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, is_tty: atty::is(atty::Stream::Stdout), log_filter: None }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

/// Guard that must be held for the lifetime of the program.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration.
///
/// If file logging cannot be set up, logs go to the console only.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    if config.is_tty {
        return init_stdout_logging(config.log_filter.as_deref());
    }

    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {e}. Using console only.");
            init_stdout_logging(config.log_filter.as_deref())
        }
    }
}

/// Initialize with the default log directory.
pub fn init_logging_default() -> LoggingGuard {
    init_logging(LogConfig::new(log_dir()))
}

fn init_stdout_logging(filter: Option<&str>) -> LoggingGuard {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_env_filter(filter))
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    LoggingGuard { _worker_guard: None }
}

fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("pgsolo")
        .filename_suffix("log")
        .build(&config.log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Console keeps to INFO and above; the file gets everything the filter allows
    let console = std::io::stderr.with_max_level(tracing::Level::INFO);
    let combined = console.and(non_blocking);

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(build_env_filter(config.log_filter.as_deref()))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    Ok(guard)
}

/// Build the filter. Priority: custom filter > `PGSOLO_LOG` > `RUST_LOG` > default.
fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "info,pgsolo=debug,pgsolo_core=debug,tokio_postgres=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "warn,pgsolo=info,pgsolo_core=info,tokio_postgres=warn"
    }
}

/// Get the default log directory.
///
/// Falls back to a relative `logs` directory when the platform has no local data dir.
pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("pgsolo"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_filter_wins() {
        let filter = build_env_filter(Some("pgsolo_core=trace"));
        assert_eq!(filter.to_string(), "pgsolo_core=trace");
    }

    #[test]
    fn test_invalid_custom_filter_falls_back_to_default() {
        let filter = build_env_filter(Some("pgsolo_core=loud"));
        assert_eq!(filter.to_string(), EnvFilter::new(default_log_filter()).to_string());
    }

    #[test]
    fn test_default_filter_names_both_crates() {
        let filter = default_log_filter();
        assert!(filter.contains("pgsolo="));
        assert!(filter.contains("pgsolo_core="));
        assert!(EnvFilter::try_new(filter).is_ok());
    }

    #[test]
    fn test_log_dir_ends_in_logs() {
        let dir = log_dir();
        assert!(dir.ends_with("logs"));
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new(PathBuf::from("/tmp/pgsolo-test")).with_filter("debug");
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/pgsolo-test"));
    }
}
