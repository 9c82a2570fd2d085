//! Prometheus metrics.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `warden_requests_total` | Counter | `endpoint`, `status` |
//! | `warden_request_duration_seconds` | Histogram | `endpoint` |
//! | `warden_in_flight_requests` | Gauge | - |
//! | `warden_authz_decisions_total` | Counter | `result` |
//! | `warden_errors_total` | Counter | `kind` |
//!
//! Recording functions go through the `metrics` facade and do nothing until
//! [`init_metrics`] installs a recorder.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

/// Requests processed, by endpoint and status.
pub const REQUESTS_TOTAL: &str = "warden_requests_total";
/// Request latency in seconds, by endpoint.
pub const REQUEST_DURATION_SECONDS: &str = "warden_request_duration_seconds";
/// Requests currently in the pipeline.
pub const IN_FLIGHT_REQUESTS: &str = "warden_in_flight_requests";
/// Authorization decisions, by result.
pub const AUTHZ_DECISIONS_TOTAL: &str = "warden_authz_decisions_total";
/// Error responses, by error kind.
pub const ERRORS_TOTAL: &str = "warden_errors_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Whether a recorder is installed.
    pub enabled: bool,

    /// Address for a standalone scrape listener. `None` keeps the exposition
    /// in-process, readable through [`render_metrics`].
    pub listen_addr: Option<String>,

    /// Bucket boundaries for the request duration histogram.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: None,
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// With a `listen_addr` the scrape listener is spawned on the current Tokio
/// runtime, so this must then be called from inside one.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidAddress`] for an unparsable listen address
/// and [`TelemetryError::MetricsInit`] if the recorder cannot be built or a
/// global recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let handle = match &config.listen_addr {
        Some(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))?;
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            builder = builder.with_http_listener(addr);

            let (recorder, exporter) = builder
                .build()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            runtime.spawn(async move {
                if exporter.await.is_err() {
                    tracing::error!("metrics exporter stopped");
                }
            });
            handle
        }
        None => builder
            .install_recorder()
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?,
    };

    let _ = METRICS_HANDLE.set(handle);
    describe_metrics();
    Ok(())
}

/// Renders the global registry in Prometheus text format.
///
/// Returns `None` if [`init_metrics`] has not installed a recorder.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// Registers help text for every Warden metric with the current recorder.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of requests processed");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Request duration from dispatch to response"
    );
    describe_gauge!(
        IN_FLIGHT_REQUESTS,
        "Number of requests currently in the pipeline"
    );
    describe_counter!(
        AUTHZ_DECISIONS_TOTAL,
        "Authorization decisions by result"
    );
    describe_counter!(ERRORS_TOTAL, "Error responses by error kind");
}

/// Records a completed request.
pub fn record_request(endpoint: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "endpoint" => endpoint.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION_SECONDS, "endpoint" => endpoint.to_string())
        .record(duration.as_secs_f64());
}

/// Records an authorization decision (`allow` or `deny`).
pub fn record_authz_decision(result: &'static str) {
    counter!(AUTHZ_DECISIONS_TOTAL, "result" => result).increment(1);
}

/// Records an error response of the given kind.
pub fn record_error(kind: &'static str) {
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Holds the in-flight gauge up for as long as it lives.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT_REQUESTS).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, f);
        handle.render()
    }

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(config.listen_addr.is_none());
        assert_eq!(config.duration_buckets.len(), 12);
    }

    #[test]
    fn test_record_request() {
        let out = rendered(|| {
            record_request("POST /projects/{project_id}", 200, Duration::from_millis(3));
            record_request("POST /projects/{project_id}", 200, Duration::from_millis(4));
        });
        assert!(out.contains(r#"warden_requests_total{endpoint="POST /projects/{project_id}",status="200"} 2"#));
        assert!(out.contains("warden_request_duration_seconds"));
    }

    #[test]
    fn test_record_decisions_and_errors() {
        let out = rendered(|| {
            record_authz_decision("allow");
            record_authz_decision("deny");
            record_authz_decision("deny");
            record_error("resource_not_in_scope");
        });
        assert!(out.contains(r#"warden_authz_decisions_total{result="deny"} 2"#));
        assert!(out.contains(r#"warden_authz_decisions_total{result="allow"} 1"#));
        assert!(out.contains(r#"warden_errors_total{kind="resource_not_in_scope"} 1"#));
    }

    #[test]
    fn test_in_flight_guard_balances() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let (while_open, after_close) = metrics::with_local_recorder(&recorder, || {
            let first = InFlightGuard::new();
            let second = InFlightGuard::new();
            drop(first);
            let while_open = handle.render();
            drop(second);
            (while_open, handle.render())
        });
        assert!(while_open.contains("warden_in_flight_requests 1"), "{while_open}");
        assert!(after_close.contains("warden_in_flight_requests 0"), "{after_close}");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("GET /", 404, Duration::ZERO);
        record_error("pass_through");
        let _guard = InFlightGuard::default();
    }

    #[test]
    fn test_disabled_metrics_is_noop() {
        let config = MetricsConfig {
            enabled: false,
            listen_addr: Some("not an address".to_string()),
            ..MetricsConfig::default()
        };
        assert!(init_metrics(&config).is_ok());
    }
}
