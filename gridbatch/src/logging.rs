//! Logging setup for gridbatch.
//!
//! Structured logging with file and console output:
//! - Writes to `logs/gridbatch.log` (cleared on session start)
//! - Mirrors to stdout in compact form
//! - Configurable via RUST_LOG environment variable

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize the global subscriber.
///
/// Creates `log_dir` if needed, clears the previous log file and installs a
/// file layer plus a stdout layer. The filter defaults to `info` when
/// `RUST_LOG` is not set.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot be
/// cleared.
pub fn init_logging(log_dir: &Path, log_file: &str) -> Result<LoggingGuard, io::Error> {
    prepare_log_file(log_dir, log_file)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .with_target(false)
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Creates the log directory and truncates the log file.
fn prepare_log_file(log_dir: &Path, log_file: &str) -> Result<(), io::Error> {
    fs::create_dir_all(log_dir)?;
    fs::write(log_dir.join(log_file), "")
}

/// Get default log directory path.
pub fn default_log_dir() -> &'static str {
    "logs"
}

/// Get default log file name.
pub fn default_log_file() -> &'static str {
    "gridbatch.log"
}
