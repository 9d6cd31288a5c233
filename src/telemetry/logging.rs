//! File and console logging setup
//!
//! The gateway itself only emits `tracing` events. Applications that want them
//! on disk call [`init_logging`] once at startup and keep the returned
//! [`LoggingGuard`] alive until shutdown.

use crate::error::GatewayError;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Directive,
    fmt::{format::FmtSpan, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Noisy dependencies capped at `warn` in every layer
const QUIET_DEPENDENCIES: &[&str] = &["tokio=warn", "hyper=warn", "h2=warn", "reqwest=warn", "rustls=warn"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f UTC";

/// Configuration for file and console logging
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Directory for the daily-rolling log files
    pub log_dir: PathBuf,
    /// File name prefix; the date is appended on rotation
    pub file_prefix: String,
    /// Filter directive for file output
    pub file_log_level: String,
    /// Filter directive for console output
    pub console_log_level: String,
    /// Whether to also log to stderr
    pub console_enabled: bool,
    /// Whether file output is JSON
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("."),
            file_prefix: "mediagate.log".to_string(),
            file_log_level: "info".to_string(),
            console_log_level: "warn".to_string(),
            console_enabled: true,
            json_format: true,
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    ///
    /// Unset or unparseable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(log_dir) = std::env::var("MEDIAGATE_LOG_DIR") {
            config.log_dir = PathBuf::from(log_dir);
        }
        if let Ok(level) = std::env::var("MEDIAGATE_FILE_LOG_LEVEL") {
            config.file_log_level = level;
        }
        if let Ok(level) = std::env::var("MEDIAGATE_CONSOLE_LOG_LEVEL") {
            config.console_log_level = level;
        }
        if let Ok(enabled) = std::env::var("MEDIAGATE_CONSOLE_LOGGING") {
            config.console_enabled = enabled.parse().unwrap_or(config.console_enabled);
        }
        if let Ok(json) = std::env::var("MEDIAGATE_JSON_LOGS") {
            config.json_format = json.parse().unwrap_or(config.json_format);
        }

        config
    }
}

/// Keeps the background file writer alive; logs are flushed when dropped
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard").finish_non_exhaustive()
    }
}

/// Build a filter from `level`, falling back to `fallback` when it does not parse
fn build_filter(level: &str, fallback: &str) -> EnvFilter {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(fallback));
    QUIET_DEPENDENCIES
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(filter, EnvFilter::add_directive)
}

/// Install the global subscriber
///
/// Returns [`GatewayError::Configuration`] when the log directory cannot be
/// created or a global subscriber is already set.
pub fn init_logging(config: LoggingConfig) -> Result<LoggingGuard, GatewayError> {
    std::fs::create_dir_all(&config.log_dir).map_err(|e| {
        GatewayError::configuration(format!("Failed to create log directory: {}", e))
    })?;

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, &config.file_prefix);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = build_filter(&config.file_log_level, "info");
    let file_layer = if config.json_format {
        tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(file_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(ChronoUtc::new(TIMESTAMP_FORMAT.to_string()))
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_filter(file_filter)
            .boxed()
    };

    let console_layer = config.console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_filter(build_filter(&config.console_log_level, "warn"))
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| GatewayError::configuration(format!("Logging already initialized: {}", e)))?;

    info!(
        log_dir = %config.log_dir.display(),
        json_format = config.json_format,
        console = config.console_enabled,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
