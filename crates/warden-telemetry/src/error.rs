//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while installing telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The metrics recorder or exporter could not be installed.
    #[error("failed to initialize metrics: {0}")]
    MetricsInit(String),

    /// The tracing subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// A configured address could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
