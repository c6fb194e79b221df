//! Logging setup
//!
//! Console output plus an optional rolling `latchkey.log` (daily unless
//! `logging.rotation` says otherwise). Each layer
//! carries its own `EnvFilter`; `RUST_LOG` overrides the configured level.
//!
//! Log files are stored in `~/latchkey/logs` by default. Override with the
//! `LATCHKEY_LOG_DIR` environment variable or `logging.dir` config.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

const LOG_FILE_NAME: &str = "latchkey.log";

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    /// Single file
    Never,
}

impl LogRotation {
    /// Parse a configured policy, ignoring case
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(LogRotation::Daily),
            "hourly" => Some(LogRotation::Hourly),
            "never" => Some(LogRotation::Never),
            _ => None,
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/latchkey/logs", home))
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    pub file_logging: bool,
    pub file_level: Level,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: false,
            file_level: Level::INFO,
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Create from application configuration. `LATCHKEY_LOG_DIR` wins over
    /// the configured directory.
    pub fn from_config(
        log_dir: Option<String>,
        console_output: bool,
        file_logging: bool,
        level: String,
        rotation: Option<String>,
    ) -> Self {
        let log_dir = std::env::var("LATCHKEY_LOG_DIR")
            .ok()
            .or(log_dir)
            .map(PathBuf::from)
            .unwrap_or_else(default_log_dir);

        let level = level.parse().unwrap_or(Level::INFO);

        Self {
            log_dir,
            console_output,
            console_level: level,
            file_logging,
            file_level: level,
            rotation: rotation
                .as_deref()
                .and_then(LogRotation::parse)
                .unwrap_or(LogRotation::Daily),
        }
    }
}

/// Keeps the non-blocking file writer alive. Dropping it flushes buffered
/// output, so hold it for the lifetime of the process.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, Box<dyn std::error::Error>> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut file_guard = None;

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter);
        layers.push(Box::new(console_layer));
    }

    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;

        let appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_filter(filter);
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: {}",
            LOG_FILE_NAME
        );
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
