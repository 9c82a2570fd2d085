//! Error reporting.
//!
//! [`ErrorReporter`] is the only place that turns an [`ApiError`] into an
//! HTTP response. It logs at a level chosen by the error kind, raises an
//! alert for internal errors, and counts every error by kind.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use tracing::{debug, error, info, warn};
use warden_core::{ApiError, ErrorBody, ErrorKind, PipelineState, RequestId};
use warden_telemetry::metrics::record_error;

use crate::types::{empty_response, Response};

/// What the reporter knows about the failed request.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Request ID.
    pub request_id: RequestId,
    /// Matched endpoint label, or the raw path when unrouted.
    pub endpoint: String,
    /// HTTP method.
    pub method: http::Method,
    /// Request path.
    pub path: String,
    /// Pipeline state when the error occurred.
    pub state: PipelineState,
    /// Stage that failed.
    pub stage: &'static str,
    /// Caller, for logs.
    pub caller: Option<String>,
}

impl RequestMeta {
    /// Creates metadata for a request that has not entered the pipeline.
    #[must_use]
    pub fn new(request_id: RequestId, method: http::Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            request_id,
            endpoint: path.clone(),
            method,
            path,
            state: PipelineState::Start,
            stage: "dispatch",
            caller: None,
        }
    }

    /// Sets the endpoint label.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Records where the pipeline failed.
    #[must_use]
    pub const fn with_failure(mut self, stage: &'static str, state: PipelineState) -> Self {
        self.stage = stage;
        self.state = state;
        self
    }

    /// Sets the caller label.
    #[must_use]
    pub fn with_caller(mut self, caller: Option<String>) -> Self {
        self.caller = caller;
        self
    }
}

/// Receives internal errors that need a human.
pub trait Alerter: Send + Sync + fmt::Debug {
    /// Raises an alert for `error`.
    fn alert(&self, meta: &RequestMeta, error: &ApiError);
}

/// Emits alerts as ERROR events on the `warden::alert` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlerter;

impl Alerter for TracingAlerter {
    fn alert(&self, meta: &RequestMeta, error: &ApiError) {
        error!(
            target: "warden::alert",
            request_id = %meta.request_id,
            endpoint = %meta.endpoint,
            stage = meta.stage,
            pipeline_state = %meta.state,
            error = %error,
            source = error.source_chain().as_deref().unwrap_or(""),
            "internal error alert"
        );
    }
}

/// Writes error responses.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    alerter: Option<Arc<dyn Alerter>>,
    log_internal_errors: bool,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReporter {
    /// Creates a reporter that logs internal errors and raises no alerts.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            alerter: None,
            log_internal_errors: true,
        }
    }

    /// Sends internal errors to `alerter`.
    #[must_use]
    pub fn with_alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerter = Some(alerter);
        self
    }

    /// Enables or disables the WARN log for internal errors.
    #[must_use]
    pub const fn with_internal_logging(mut self, enabled: bool) -> Self {
        self.log_internal_errors = enabled;
        self
    }

    /// Logs `error` and builds its response.
    pub fn report(&self, meta: &RequestMeta, error: &ApiError) -> Response {
        let kind = error.kind();
        record_error(kind.as_str());
        self.log(meta, error);

        if kind == ErrorKind::Internal {
            self.raise(meta, error);
        }

        match build_response(error) {
            Ok(response) => response,
            Err(build_error) => {
                error!(
                    request_id = %meta.request_id,
                    error_kind = kind.as_str(),
                    error = %build_error,
                    "failed to build error response"
                );
                let fallback = ApiError::internal_with_source("building error response", build_error);
                self.raise(meta, &fallback);
                empty_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn log(&self, meta: &RequestMeta, error: &ApiError) {
        let caller = meta.caller.as_deref().unwrap_or("anonymous");
        match error.kind() {
            ErrorKind::Internal => {
                if self.log_internal_errors && !error.is_log_suppressed() {
                    warn!(
                        request_id = %meta.request_id,
                        endpoint = %meta.endpoint,
                        stage = meta.stage,
                        pipeline_state = %meta.state,
                        caller,
                        error = %error,
                        source = error.source_chain().as_deref().unwrap_or(""),
                        "internal error"
                    );
                }
            }
            ErrorKind::Cancelled => info!(
                request_id = %meta.request_id,
                endpoint = %meta.endpoint,
                pipeline_state = %meta.state,
                reason = %error,
                "request cancelled"
            ),
            ErrorKind::Forbidden | ErrorKind::ResourceNotInScope => info!(
                request_id = %meta.request_id,
                endpoint = %meta.endpoint,
                stage = meta.stage,
                caller,
                error = %error,
                "request denied"
            ),
            ErrorKind::MalformedParameter | ErrorKind::BadRequest | ErrorKind::PassThrough => {
                debug!(
                    request_id = %meta.request_id,
                    method = %meta.method,
                    path = %meta.path,
                    error_kind = error.kind().as_str(),
                    error = %error,
                    "request rejected"
                );
            }
        }
    }

    fn raise(&self, meta: &RequestMeta, error: &ApiError) {
        if let Some(alerter) = &self.alerter {
            alerter.alert(meta, error);
        }
    }
}

fn build_response(error: &ApiError) -> Result<Response, ResponseBuildError> {
    let Some(message) = error.external_message() else {
        return Ok(empty_response(error.status_code()));
    };
    let body = serde_json::to_vec(&ErrorBody::new(message))?;
    let response = http::Response::builder()
        .status(error.status_code())
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(Full::new(Bytes::from(body)))?;
    Ok(response)
}

#[derive(Debug, thiserror::Error)]
enum ResponseBuildError {
    #[error("serializing error body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("building response: {0}")]
    Http(#[from] http::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use parking_lot::Mutex;
    use warden_core::{CancelReason, IdKind};

    #[derive(Debug, Default)]
    struct RecordingAlerter {
        alerts: Mutex<Vec<String>>,
    }

    impl Alerter for RecordingAlerter {
        fn alert(&self, meta: &RequestMeta, error: &ApiError) {
            self.alerts.lock().push(format!("{}: {error}", meta.stage));
        }
    }

    fn meta() -> RequestMeta {
        RequestMeta::new(RequestId::new(), http::Method::GET, "/projects/1")
            .with_failure("hydrate", PipelineState::Hydrated(0))
    }

    async fn body(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_parameter_body() {
        let reporter = ErrorReporter::new();
        let err = ApiError::malformed_parameter("project_id", "notuint", IdKind::Uint);
        let response = reporter.report(&meta(), &err);

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            body(response).await,
            r#"{"error":"could not convert url parameter project_id to uint, got notuint"}"#
        );
    }

    #[tokio::test]
    async fn test_internal_hides_details_and_alerts() {
        let alerter = Arc::new(RecordingAlerter::default());
        let reporter = ErrorReporter::new().with_alerter(alerter.clone());
        let err = ApiError::internal_with_source(
            "reading cluster 1",
            anyhow::anyhow!("connection reset"),
        );

        let response = reporter.report(&meta(), &err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = body(response).await;
        assert_eq!(text, r#"{"error":"An internal error occurred."}"#);
        assert!(!text.contains("connection reset"));

        let alerts = alerter.alerts.lock();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].starts_with("hydrate:"));
    }

    #[tokio::test]
    async fn test_forbidden_does_not_alert() {
        let alerter = Arc::new(RecordingAlerter::default());
        let reporter = ErrorReporter::new().with_alerter(alerter.clone());

        let response = reporter.report(&meta(), &ApiError::forbidden("user:8 lacks create"));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body(response).await, r#"{"error":"Forbidden"}"#);
        assert!(alerter.alerts.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_has_no_body() {
        let reporter = ErrorReporter::new();
        let response = reporter.report(&meta(), &ApiError::cancelled(CancelReason::ClientCancelled));

        assert_eq!(response.status().as_u16(), 499);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
        assert!(body(response).await.is_empty());
    }

    #[test]
    fn test_errors_counted_by_kind() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let reporter = ErrorReporter::new();
            reporter.report(&meta(), &ApiError::bad_request("no"));
            reporter.report(&meta(), &ApiError::bad_request("no"));
        });

        assert!(handle
            .render()
            .contains(r#"warden_errors_total{kind="bad_request"} 2"#));
    }
}
