/// Structured logging for the reporting service
///
/// Thin layer over `tracing` that stamps every event with the data source
/// and, where relevant, the sensor it concerns. Supports console output
/// and an append-only log file for batch runs.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::model::{FetchError, ReportError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Remote time-series / station API.
    Iow,
    /// OAuth token endpoint.
    Token,
    /// Offline payload replay.
    Replay,
    /// Segmentation and aggregation.
    Engine,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Iow => write!(f, "IOW"),
            DataSource::Token => write!(f, "TOKEN"),
            DataSource::Replay => write!(f, "REPLAY"),
            DataSource::Engine => write!(f, "ENGINE"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - sensor offline or not reporting in this window
    Expected,
    /// Unexpected failure - service degradation, credentials, or API change
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// Initialize the global subscriber.
///
/// `RUST_LOG`, when set, overrides `min_level`. With a `log_file` every event
/// is appended there instead of the console. Calling this twice is harmless:
/// the first subscriber stays installed.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
    console_timestamps: bool,
) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.as_directive()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None if console_timestamps => builder.try_init(),
        None => builder.without_time().try_init(),
    };

    if installed.is_err() {
        debug(DataSource::System, None, "logger already initialized");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(source: DataSource, sensor_id: Option<&str>, message: &str) {
    tracing::info!(source = %source, sensor = sensor_id.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(source: DataSource, sensor_id: Option<&str>, message: &str) {
    tracing::warn!(source = %source, sensor = sensor_id.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(source: DataSource, sensor_id: Option<&str>, message: &str) {
    tracing::error!(source = %source, sensor = sensor_id.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(source: DataSource, sensor_id: Option<&str>, message: &str) {
    tracing::debug!(source = %source, sensor = sensor_id.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a per-sensor failure.
///
/// A 404 after every retry usually means the station or quantity id in the
/// sensor list is wrong or retired; everything that points at the service
/// or our credentials is unexpected.
pub fn classify_failure(err: &ReportError) -> FailureType {
    match err {
        ReportError::FetchExhausted { last: FetchError::Http(404), .. } => FailureType::Expected,
        ReportError::FetchExhausted { last: FetchError::Http(_), .. } => FailureType::Unexpected,
        ReportError::FetchExhausted { last: FetchError::Network(_), .. } => FailureType::Unknown,
        ReportError::TokenRefresh(_) => FailureType::Unexpected,
        ReportError::MalformedPayload(_) => FailureType::Unexpected,
        ReportError::InvalidWindow { .. } | ReportError::Config(_) => FailureType::Unexpected,
        ReportError::Io(_) => FailureType::Unknown,
    }
}

/// Log a sensor failure with automatic classification
pub fn log_sensor_failure(sensor_id: &str, operation: &str, err: &ReportError) {
    let failure_type = classify_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(DataSource::Iow, Some(sensor_id), &message),
        FailureType::Unexpected => error(DataSource::Iow, Some(sensor_id), &message),
        FailureType::Unknown => warn(DataSource::Iow, Some(sensor_id), &message),
    }
}

// ---------------------------------------------------------------------------
// Batch Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one batch report
pub fn log_batch_summary(report: &str, total: usize, successful: usize, failed: usize) {
    let message = format!(
        "{} complete: {}/{} sensors successful, {} failed",
        report, successful, total, failed
    );

    if failed == 0 {
        info(DataSource::System, None, &message);
    } else if successful == 0 {
        error(DataSource::System, None, &message);
    } else {
        warn(DataSource::System, None, &message);
    }
}
