//! Logging and metrics for Warden.
//!
//! - **Logging**: `tracing` events rendered by `tracing-subscriber`, JSON in
//!   production and pretty in development, with shared field names in
//!   [`logging::fields`].
//! - **Metrics**: the `metrics` facade backed by a Prometheus recorder. See
//!   [`metrics`] for the emitted series.
//!
//! ```rust,ignore
//! use warden_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder().service_name("warden").build();
//! init_telemetry(&config)?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use crate::config::{TelemetryConfig, TelemetryConfigBuilder};
pub use crate::error::TelemetryError;
pub use crate::logging::{fields, init_logging, LogConfig};
pub use crate::metrics::{init_metrics, render_metrics, InFlightGuard, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Installs logging, then metrics.
///
/// # Errors
///
/// Returns the first subsystem failure.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    tracing::info!(service = %config.service_name, "telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_everything_disabled() {
        let config = TelemetryConfig {
            logging: LogConfig {
                enabled: false,
                ..LogConfig::default()
            },
            metrics: MetricsConfig {
                enabled: false,
                ..MetricsConfig::default()
            },
            ..TelemetryConfig::default()
        };
        assert!(init_telemetry(&config).is_ok());
        assert!(render_metrics().is_none());
    }
}
