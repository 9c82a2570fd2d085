//! Typed, layered configuration for Warden.
//!
//! [`WardenConfig`] has three sections:
//!
//! - [`ServerConfig`]: bind address, request deadline, shutdown timeout and
//!   connection limit
//! - [`PipelineConfig`]: alerting and internal error logging
//! - [`TelemetrySection`]: logging and metrics
//!
//! Every section rejects unknown fields and fills omitted ones with defaults.
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! request_timeout_ms = 30000
//! shutdown_timeout_secs = 30
//! max_connections = 10000
//!
//! [pipeline]
//! alerts_enabled = true
//! log_internal_errors = true
//!
//! [telemetry]
//! service_name = "warden"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//! listen_addr = "0.0.0.0:9464"
//! ```
//!
//! Environment variables override file values as `PREFIX__SECTION__KEY`, e.g.
//! `WARDEN__SERVER__REQUEST_TIMEOUT_MS=5000` or
//! `WARDEN__TELEMETRY__LOGGING__FORMAT=pretty`.

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{WardenConfig, WardenConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    LogFormat, LoggingConfig, MetricsConfig, PipelineConfig, ServerConfig, TelemetrySection,
};
