//! Error types for the request pipeline.
//!
//! [`ApiError`] is the only error a pipeline stage or handler returns. Each
//! variant maps to one [`ErrorKind`], which fixes the HTTP status and the
//! metric label:
//!
//! | `ErrorKind` | Status |
//! |---|---|
//! | `MalformedParameter` | 400 |
//! | `BadRequest` | 400 |
//! | `Forbidden` | 403 |
//! | `ResourceNotInScope` | 403 |
//! | `Internal` | 500 |
//! | `PassThrough` | carried by the error |
//! | `Cancelled` | 499 |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::scope::IdKind;

/// Result type alias using [`ApiError`].
pub type ApiResult<T> = Result<T, ApiError>;

/// Non-standard status used for requests abandoned before completion.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Generic message sent to clients for internal errors.
pub const INTERNAL_MESSAGE: &str = "An internal error occurred.";

/// Generic message sent to clients for authorization denials.
pub const FORBIDDEN_MESSAGE: &str = "Forbidden";

/// Classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A URL parameter could not be parsed.
    MalformedParameter,
    /// The request is invalid for a reason other than a URL parameter.
    BadRequest,
    /// The caller may not perform the request.
    Forbidden,
    /// A referenced resource does not exist under its parent.
    ResourceNotInScope,
    /// Something failed on the server.
    Internal,
    /// A status chosen by the caller, sent as-is.
    PassThrough,
    /// The request was abandoned.
    Cancelled,
}

impl ErrorKind {
    /// Returns the snake_case label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedParameter => "malformed_parameter",
            Self::BadRequest => "bad_request",
            Self::Forbidden => "forbidden",
            Self::ResourceNotInScope => "resource_not_in_scope",
            Self::Internal => "internal",
            Self::PassThrough => "pass_through",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true for kinds caused by the client rather than the server.
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        !matches!(self, Self::Internal | Self::Cancelled)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The client disconnected or the server is shutting down.
    ClientCancelled,
    /// The per-request deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientCancelled => f.write_str("request cancelled"),
            Self::DeadlineExceeded => f.write_str("request deadline exceeded"),
        }
    }
}

/// Error returned by pipeline stages and handlers.
///
/// The `Display` output is the internal description and may contain details
/// that must not reach clients; use [`ApiError::external_message`] for the
/// response body.
///
/// # Example
///
/// ```
/// use warden_core::{ApiError, ErrorKind, IdKind};
/// use http::StatusCode;
///
/// let err = ApiError::malformed_parameter("project_id", "notuint", IdKind::Uint);
/// assert_eq!(err.kind(), ErrorKind::MalformedParameter);
/// assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
/// assert_eq!(
///     err.external_message().as_deref(),
///     Some("could not convert url parameter project_id to uint, got notuint")
/// );
/// ```
#[derive(Error, Debug)]
pub enum ApiError {
    /// A URL parameter could not be converted to its declared type.
    #[error("could not convert url parameter {name} to {expected}, got {value}")]
    MalformedParameter {
        /// Parameter name.
        name: String,
        /// Raw value from the URL (empty if the route did not capture it).
        value: String,
        /// Declared identifier shape.
        expected: IdKind,
    },

    /// The request is invalid.
    #[error("bad request: {message}")]
    BadRequest {
        /// Message sent verbatim.
        message: String,
    },

    /// The caller may not perform the request.
    #[error("forbidden: {reason}")]
    Forbidden {
        /// Reason for logs.
        reason: String,
        /// Whether `reason` may be sent to the client.
        public: bool,
    },

    /// A referenced resource does not exist under its parent.
    #[error("{message}")]
    ResourceNotInScope {
        /// Message sent verbatim.
        message: String,
    },

    /// Something failed on the server.
    #[error("internal error: {message}")]
    Internal {
        /// Description for logs.
        message: String,
        /// The underlying error (never sent to clients).
        #[source]
        source: Option<anyhow::Error>,
        /// Skip the WARN log in the reporter.
        suppress_log: bool,
    },

    /// A status chosen by the caller.
    #[error("{status}: {message}")]
    PassThrough {
        /// Response status.
        status: StatusCode,
        /// Message sent verbatim.
        message: String,
    },

    /// The request was abandoned before completion.
    #[error("{reason}")]
    Cancelled {
        /// Cancellation cause.
        reason: CancelReason,
    },
}

impl ApiError {
    /// Creates a malformed parameter error.
    #[must_use]
    pub fn malformed_parameter(
        name: impl Into<String>,
        value: impl Into<String>,
        expected: IdKind,
    ) -> Self {
        Self::MalformedParameter {
            name: name.into(),
            value: value.into(),
            expected,
        }
    }

    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a forbidden error whose reason is only logged.
    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
            public: false,
        }
    }

    /// Creates a forbidden error whose reason is sent to the client.
    #[must_use]
    pub fn forbidden_public(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
            public: true,
        }
    }

    /// Creates a resource-not-in-scope error.
    #[must_use]
    pub fn not_in_scope(message: impl Into<String>) -> Self {
        Self::ResourceNotInScope {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
            suppress_log: false,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
            suppress_log: false,
        }
    }

    /// Creates a pass-through error.
    #[must_use]
    pub fn pass_through(status: StatusCode, message: impl Into<String>) -> Self {
        Self::PassThrough {
            status,
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    #[must_use]
    pub const fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled { reason }
    }

    /// Marks an internal error as already logged.
    ///
    /// Has no effect on other kinds.
    #[must_use]
    pub fn with_suppressed_log(mut self) -> Self {
        if let Self::Internal { suppress_log, .. } = &mut self {
            *suppress_log = true;
        }
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedParameter { .. } => ErrorKind::MalformedParameter,
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::ResourceNotInScope { .. } => ErrorKind::ResourceNotInScope,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::PassThrough { .. } => ErrorKind::PassThrough,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedParameter { .. } | Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } | Self::ResourceNotInScope { .. } => StatusCode::FORBIDDEN,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PassThrough { status, .. } => *status,
            Self::Cancelled { .. } => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::REQUEST_TIMEOUT),
        }
    }

    /// Returns the message safe to send to clients.
    ///
    /// `None` means the response carries no body.
    #[must_use]
    pub fn external_message(&self) -> Option<String> {
        match self {
            Self::MalformedParameter { .. } => Some(self.to_string()),
            Self::BadRequest { message }
            | Self::ResourceNotInScope { message }
            | Self::PassThrough { message, .. } => Some(message.clone()),
            Self::Forbidden { reason, public } => Some(if *public {
                reason.clone()
            } else {
                FORBIDDEN_MESSAGE.to_string()
            }),
            Self::Internal { .. } => Some(INTERNAL_MESSAGE.to_string()),
            Self::Cancelled { .. } => None,
        }
    }

    /// Returns true if the reporter should skip the WARN log.
    #[must_use]
    pub const fn is_log_suppressed(&self) -> bool {
        matches!(
            self,
            Self::Internal {
                suppress_log: true,
                ..
            }
        )
    }

    /// Returns the source chain of an internal error for logging.
    #[must_use]
    pub fn source_chain(&self) -> Option<String> {
        match self {
            Self::Internal {
                source: Some(source),
                ..
            } => Some(format!("{source:?}")),
            _ => None,
        }
    }
}

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Client-facing message.
    pub error: String,
}

impl ErrorBody {
    /// Creates an error body.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
