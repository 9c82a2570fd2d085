//! Structured logging.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a single
//! fmt layer. Production deployments emit one JSON object per event;
//! development uses the multi-line pretty format.
//!
//! Pipeline code logs with the field names in [`fields`] so events from
//! different stages of one request can be joined on `request_id`:
//!
//! ```rust,ignore
//! tracing::debug!(request_id = %ctx.request_id(), scope = "cluster", "hydrated");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether a subscriber is installed at all.
    pub enabled: bool,

    /// Filter directive, e.g. `info` or `warden_middleware=debug,info`.
    pub level: String,

    /// JSON output when true, pretty output otherwise.
    pub json_format: bool,

    /// Emit span open/close events.
    pub span_events: bool,

    /// Include source file and line.
    pub file_line_info: bool,

    /// Include the event target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Human-readable output at debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            include_target: true,
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            include_target: true,
        }
    }
}

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::LoggingInit`] if the filter directive is invalid
/// or a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_span_events(span_events)
        .with_file(config.file_line_info)
        .with_line_number(config.file_line_info)
        .with_target(config.include_target);

    let layer = if config.json_format {
        layer.json().with_filter(filter).boxed()
    } else {
        layer.pretty().with_filter(filter).boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Parses a filter directive.
///
/// # Errors
///
/// Returns [`TelemetryError::LoggingInit`] if the directive does not parse.
pub fn create_env_filter(directive: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid log level {directive:?}: {e}")))
}

/// Field names shared by every pipeline log event.
pub mod fields {
    /// Request identifier.
    pub const REQUEST_ID: &str = "request_id";

    /// Registered endpoint, `METHOD /template`.
    pub const ENDPOINT: &str = "endpoint";

    /// Scope kind being resolved or hydrated.
    pub const SCOPE: &str = "scope";

    /// Requested verb.
    pub const VERB: &str = "verb";

    /// Error kind label.
    pub const ERROR_KIND: &str = "error_kind";

    /// Pipeline state at the time of the event.
    pub const PIPELINE_STATE: &str = "pipeline_state";

    /// Caller identity, `user:<id>` or `token:<id>`.
    pub const CALLER: &str = "caller";

    /// HTTP status code.
    pub const HTTP_STATUS: &str = "http.status_code";

    /// Elapsed time in milliseconds.
    pub const DURATION_MS: &str = "duration_ms";
}
