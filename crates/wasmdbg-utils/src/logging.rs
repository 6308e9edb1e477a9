//! # Logging
//!
//! `tracing` subscriber setup shared by the wasmdbg binaries.
//!
//! Console output goes to stderr so command output on stdout stays clean.
//! Lines are either pretty (for terminals) or JSON (one object per line).
//! A copy can also be written to a file through a non-blocking writer.
//!
//! ```rust,no_run
//! use wasmdbg_utils::init_logging;
//!
//! let _guard = init_logging().expect("Failed to initialize logging");
//! tracing::info!("ready");
//! ```
//!
//! ## Environment
//!
//! - `RUST_LOG`: filter directives (`debug`, `wasmdbg_core=trace`, ...)
//! - `WASMDBG_LOG_FORMAT`: `pretty` (default) or `json`
//! - `WASMDBG_LOG_FILE`: optional log file. A directory gets a dated file
//!   (`YYYY-MM-DD-wasmdbg.log`) inside it; any other path rolls daily.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "WASMDBG_LOG_FORMAT";
/// Environment variable naming the log file.
pub const LOG_FILE_ENV: &str = "WASMDBG_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Shape of each log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("unknown log format {s:?} (expected pretty or json)")),
        }
    }
}

/// Most verbose level that is printed when `RUST_LOG` is not consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("unknown log level {s:?} (expected error, warn, info, debug or trace)")),
        }
    }
}

/// Keeps the background log file writer alive.
///
/// Buffered lines are flushed when the guard is dropped, so hold it until
/// the program exits.
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard
{
    _worker: Option<WorkerGuard>,
    /// Where file output goes, if anywhere
    pub file: Option<PathBuf>,
}

/// Install the global subscriber configured from the environment.
///
/// ## Errors
///
/// Fails when `WASMDBG_LOG_FORMAT` is not a known format, when a subscriber
/// is already installed, or when the log directory cannot be created.
pub fn init_logging() -> Result<LogGuard, LoggingError>
{
    let format = match env::var(LOG_FORMAT_ENV) {
        Ok(raw) => LogFormat::from_str(&raw).map_err(LoggingError::InvalidFormat)?,
        Err(_) => LogFormat::Pretty,
    };
    init_logging_internal(format, None)
}

/// Install the global subscriber with a fixed level, ignoring `RUST_LOG`.
///
/// ## Example
///
/// ```rust,no_run
/// use wasmdbg_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Same as [`init_logging`], minus the format check.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LogGuard, LoggingError>
{
    init_logging_internal(format, Some(level.into()))
}

/// Filter from the explicit level, else `RUST_LOG`, else `info`.
fn build_filter(explicit_level: Option<Level>) -> EnvFilter
{
    match explicit_level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
    }
}

fn init_logging_internal(format: LogFormat, explicit_level: Option<Level>) -> Result<LogGuard, LoggingError>
{
    let console_layer: BoxedLayer = match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(true)
            .with_writer(io::stderr)
            .with_filter(build_filter(explicit_level))
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(io::stderr)
            .with_filter(build_filter(explicit_level))
            .boxed(),
    };

    let mut guard = LogGuard { _worker: None, file: None };
    let mut layers = vec![console_layer];
    if let Some(requested) = env::var_os(LOG_FILE_ENV).map(PathBuf::from) {
        let (directory, file_name, dated) = log_file_target(&requested)?;
        let appender = if dated {
            tracing_appender::rolling::never(&directory, &file_name)
        } else {
            tracing_appender::rolling::daily(&directory, &file_name)
        };
        let (non_blocking, worker) = tracing_appender::non_blocking(appender);

        let file_layer: BoxedLayer = match format {
            LogFormat::Pretty => fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_filter(build_filter(explicit_level))
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_filter(build_filter(explicit_level))
                .boxed(),
        };
        layers.push(file_layer);
        guard._worker = Some(worker);
        guard.file = Some(directory.join(file_name));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(guard)
}

/// Split the requested log file into directory, file name and whether the
/// name is already dated.
fn log_file_target(requested: &Path) -> Result<(PathBuf, String, bool), LoggingError>
{
    if requested.is_dir() {
        let today = Utc::now().format("%Y-%m-%d");
        return Ok((requested.to_path_buf(), format!("{today}-wasmdbg.log"), true));
    }

    let directory = requested
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    std::fs::create_dir_all(&directory).map_err(LoggingError::FileError)?;
    let file_name = requested
        .file_name()
        .map_or_else(|| "wasmdbg.log".to_string(), |name| name.to_string_lossy().into_owned());
    Ok((directory, file_name, false))
}

/// Why the subscriber could not be installed.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// A global subscriber is already set
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// The log file location could not be prepared
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("text").unwrap(), LogFormat::Pretty);
        assert!(LogFormat::from_str("xml").is_err());
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(LogLevel::from_str("verbose").is_err());
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert!(Level::from(LogLevel::Error) < Level::from(LogLevel::Info));
    }

    #[test]
    fn test_log_file_target_for_directory()
    {
        let directory = env::temp_dir();
        let (dir, name, dated) = log_file_target(&directory).unwrap();
        assert_eq!(dir, directory);
        assert!(dated);
        assert!(name.ends_with("-wasmdbg.log"));
        assert_eq!(name.len(), "YYYY-MM-DD-wasmdbg.log".len());
    }

    #[test]
    fn test_log_file_target_for_bare_name()
    {
        let (dir, name, dated) = log_file_target(Path::new("session.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "session.log");
        assert!(!dated);
    }
}
