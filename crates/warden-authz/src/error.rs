//! Error types for the authorization crate.

use thiserror::Error;
use warden_core::ApiError;

/// Result type for policy loading.
pub type PolicyLoadResult<T> = Result<T, PolicyLoadError>;

/// Errors that can occur while loading policy documents.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PolicyLoadError {
    /// The API token is bound to a different project.
    #[error("token {token_id} is bound to project {token_project_id}, not {project_id}")]
    TokenProjectMismatch {
        /// Token id.
        token_id: u64,
        /// Project the token is bound to.
        token_project_id: u64,
        /// Project the request targets.
        project_id: u64,
    },

    /// The API token does not exist.
    #[error("token {0} not found")]
    TokenNotFound(u64),

    /// The API token was revoked.
    #[error("token {0} is revoked")]
    TokenRevoked(u64),

    /// The policy backend failed.
    #[error("policy backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl PolicyLoadError {
    /// Create a backend error.
    pub fn backend(source: impl Into<anyhow::Error>) -> Self {
        Self::Backend(source.into())
    }

    /// Check if this error denies the caller rather than failing the server.
    pub const fn is_denial(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}

impl From<PolicyLoadError> for ApiError {
    fn from(err: PolicyLoadError) -> Self {
        match err {
            PolicyLoadError::Backend(source) => {
                ApiError::internal_with_source("loading policy documents", source)
            }
            denial => ApiError::forbidden(denial.to_string()),
        }
    }
}
