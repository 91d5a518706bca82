//! Logging configuration and initialization
//!
//! Provides structured logging with tracing, supporting console output,
//! file logging and JSON format for production.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::settings::PipelineSettings;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Write logs to `file_path` as well
    pub file_enabled: bool,
    pub file_path: Option<PathBuf>,
    /// Use JSON format for logs (default: false)
    pub json_format: bool,
    /// Default log level filter (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Logging section of the pipeline settings
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            console_enabled: true,
            file_enabled: settings.log_file.is_some(),
            file_path: settings.log_file.as_ref().map(PathBuf::from),
            json_format: settings.log_json,
            default_level: settings.log_level.clone(),
        }
    }
}

/// Initialize the logging system with the given configuration
///
/// Returns a guard that must be kept alive while logging to a file so the
/// background writer flushes.
///
/// # Environment Variables
///
/// - `RTC_FRAME_LOG`: Set log level filter (e.g., "debug", "info,rtc_video_frame=trace")
/// - `RTC_FRAME_LOG_FORMAT`: Set to "json" for JSON output on the console and in the file
///
/// # Example
///
/// ```no_run
/// use rtc_video_frame::telemetry::{init_logging, LogConfig};
///
/// let config = LogConfig::default();
/// let _guard = init_logging(&config).expect("Failed to initialize logging");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    // RTC_FRAME_LOG first, then RUST_LOG, then the configured default
    let env_filter = EnvFilter::try_from_env("RTC_FRAME_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let use_json = resolve_json(std::env::var("RTC_FRAME_LOG_FORMAT").ok(), config.json_format);

    let mut file_guard: Option<WorkerGuard> = None;
    let mut file_writer = None;
    let log_path = config
        .file_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("rtc_video_frame.log"));
    if config.file_enabled {
        let file = std::fs::File::create(&log_path)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        file_guard = Some(guard);
        file_writer = Some(non_blocking);
    }

    // JSON applies to every enabled output; the file never gets ANSI colors
    let file_json = file_writer.clone().filter(|_| use_json).map(|writer| {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
    });
    let file_text = file_writer.filter(|_| !use_json).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
    });
    let console_json = (config.console_enabled && use_json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let console_text = (config.console_enabled && !use_json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_json)
        .with(file_text)
        .with(console_json)
        .with(console_text)
        .try_init()?;

    if config.file_enabled {
        eprintln!("Logging to file: {}", log_path.display());
    }

    tracing::info!(
        target: "rtc_video_frame",
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(file_guard)
}

/// `RTC_FRAME_LOG_FORMAT=json` forces JSON; any other value forces text
fn resolve_json(format_env: Option<String>, configured: bool) -> bool {
    format_env
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(configured)
}

/// Initialize logging from environment with the default config
pub fn init_logging_default() -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    init_logging(&LogConfig::default())
}

// Re-export WorkerGuard so callers can store it
pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;
