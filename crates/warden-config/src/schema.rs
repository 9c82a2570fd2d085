//! Configuration sections.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP server section.
///
/// ```
/// use warden_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:8080".to_string(),
///     ..ServerConfig::default()
/// };
/// assert_eq!(config.request_timeout().as_millis(), 30_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0:8080`.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Per-request deadline in milliseconds, counted from arrival. Covers
    /// reading the body, policy load, hydration and the handler.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// How long shutdown waits for in-flight connections, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum number of concurrently served connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// The per-request deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The graceful shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            request_timeout_ms: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_connections: default_max_connections(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10_000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Request pipeline section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Send internal errors to the alert sink.
    #[serde(default = "default_true")]
    pub alerts_enabled: bool,

    /// Log internal errors with their source chain.
    #[serde(default = "default_true")]
    pub log_internal_errors: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            alerts_enabled: true,
            log_internal_errors: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Install a subscriber.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (`info`, `warden_middleware=debug,info`, ...).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Emit span open/close events.
    #[serde(default)]
    pub span_events: bool,

    /// Include source file and line.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            span_events: false,
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install a Prometheus recorder.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Standalone scrape listener address. Unset keeps metrics in-process.
    #[serde(default)]
    pub listen_addr: Option<String>,

    /// Request duration histogram buckets, in seconds.
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: None,
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

fn default_histogram_buckets() -> Vec<f64> {
    warden_telemetry::MetricsConfig::default().duration_buckets
}

/// Telemetry section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name reported at startup.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl TelemetrySection {
    /// Converts the section into the telemetry crate's configuration.
    #[must_use]
    pub fn to_telemetry_config(&self) -> warden_telemetry::TelemetryConfig {
        let logging = warden_telemetry::LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            json_format: self.logging.format == LogFormat::Json,
            span_events: self.logging.span_events,
            file_line_info: self.logging.include_location,
            include_target: true,
        };
        let metrics = warden_telemetry::MetricsConfig {
            enabled: self.metrics.enabled,
            listen_addr: self.metrics.listen_addr.clone(),
            duration_buckets: self.metrics.histogram_buckets.clone(),
        };
        warden_telemetry::TelemetryConfig::builder()
            .service_name(self.service_name.clone())
            .logging(logging)
            .metrics(metrics)
            .build()
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "warden".to_string()
}

fn default_true() -> bool {
    true
}
