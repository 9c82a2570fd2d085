//! The root configuration type.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, LogFormat, PipelineConfig, ServerConfig, TelemetrySection};

/// Complete Warden configuration.
///
/// ```
/// use warden_config::WardenConfig;
///
/// let config = WardenConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.pipeline.alerts_enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct WardenConfig {
    /// HTTP server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Request pipeline.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl WardenConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> WardenConfigBuilder {
        WardenConfigBuilder::default()
    }

    /// Validates values serde cannot check.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_connections",
                "must be greater than zero",
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than zero",
            ));
        }

        let metrics = &self.telemetry.metrics;
        if let Some(addr) = metrics.listen_addr.as_deref() {
            if metrics.enabled && addr.parse::<SocketAddr>().is_err() {
                return Err(ConfigError::invalid_value(
                    "telemetry.metrics.listen_addr",
                    format!("invalid socket address: {addr}"),
                ));
            }
        }
        if metrics
            .histogram_buckets
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.histogram_buckets",
                "must be strictly increasing",
            ));
        }

        if self.telemetry.logging.enabled {
            warden_telemetry::logging::create_env_filter(&self.telemetry.logging.level)
                .map_err(|e| ConfigError::invalid_value("telemetry.logging.level", e.to_string()))?;
        }

        Ok(())
    }

    /// Local development preset: pretty debug logs, generous deadline, no alerts.
    ///
    /// ```
    /// use warden_config::{LogFormat, WardenConfig};
    ///
    /// let config = WardenConfig::development();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.http_addr = "127.0.0.1:8080".to_string();
        config.server.request_timeout_ms = 120_000;
        config.pipeline.alerts_enabled = false;
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config
    }

    /// Production preset: JSON info logs with alerting.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.pipeline.alerts_enabled = true;
        config.pipeline.log_internal_errors = true;
        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config
    }
}

/// Builder for [`WardenConfig`].
#[derive(Debug, Default)]
pub struct WardenConfigBuilder {
    server: Option<ServerConfig>,
    pipeline: Option<PipelineConfig>,
    telemetry: Option<TelemetrySection>,
}

impl WardenConfigBuilder {
    /// Sets the server section.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Sets the pipeline section.
    #[must_use]
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Sets the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Builds the configuration; unset sections use defaults.
    #[must_use]
    pub fn build(self) -> WardenConfig {
        WardenConfig {
            server: self.server.unwrap_or_default(),
            pipeline: self.pipeline.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn build_validated(self) -> Result<WardenConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsConfig;

    #[test]
    fn test_default_is_valid() {
        assert!(WardenConfig::default().validate().is_ok());
        assert!(WardenConfig::development().validate().is_ok());
        assert!(WardenConfig::production().validate().is_ok());
    }

    #[test]
    fn test_invalid_http_addr() {
        let config = WardenConfig::builder()
            .server(ServerConfig {
                http_addr: "localhost".to_string(),
                ..ServerConfig::default()
            })
            .build();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.http_addr"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = WardenConfig::builder()
            .server(ServerConfig {
                request_timeout_ms: 0,
                ..ServerConfig::default()
            })
            .build_validated()
            .unwrap_err();
        assert!(err.to_string().contains("request_timeout_ms"));
    }

    #[test]
    fn test_zero_body_limit_rejected() {
        let err = WardenConfig::builder()
            .server(ServerConfig {
                max_body_bytes: 0,
                ..ServerConfig::default()
            })
            .build_validated()
            .unwrap_err();
        assert!(err.to_string().contains("server.max_body_bytes"));
    }

    #[test]
    fn test_invalid_metrics_listener() {
        let mut telemetry = TelemetrySection::default();
        telemetry.metrics = MetricsConfig {
            listen_addr: Some("metrics-host".to_string()),
            ..MetricsConfig::default()
        };
        let err = WardenConfig::builder()
            .telemetry(telemetry.clone())
            .build_validated()
            .unwrap_err();
        assert!(err.to_string().contains("listen_addr"));

        telemetry.metrics.enabled = false;
        assert!(WardenConfig::builder()
            .telemetry(telemetry)
            .build_validated()
            .is_ok());
    }

    #[test]
    fn test_unsorted_buckets_rejected() {
        let mut config = WardenConfig::default();
        config.telemetry.metrics.histogram_buckets = vec![0.5, 0.1];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let mut config = WardenConfig::default();
        config.telemetry.logging.level = "warden=[[".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("telemetry.logging.level"));
    }

    #[test]
    fn test_development_preset() {
        let config = WardenConfig::development();
        assert!(!config.pipeline.alerts_enabled);
        assert_eq!(config.server.request_timeout_ms, 120_000);
        assert_eq!(config.telemetry.logging.level, "debug");
    }
}
