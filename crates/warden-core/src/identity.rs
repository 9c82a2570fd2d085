//! Caller identity.
//!
//! Authentication happens upstream. By the time a request reaches the
//! pipeline, an identity adapter has already attached a [`CallerIdentity`]
//! to the request context. A request without one is denied by the policy stage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The authenticated principal making a request.
///
/// # Example
///
/// ```
/// use warden_core::CallerIdentity;
///
/// let token = CallerIdentity::api_token(12, 1);
/// assert_eq!(token.log_id(), "token:12");
/// assert_eq!(token.token_project_id(), Some(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallerIdentity {
    /// A human user.
    User {
        /// User id.
        id: u64,
    },
    /// A project-bound API token.
    ApiToken {
        /// Token id.
        id: u64,
        /// Project the token was issued for.
        project_id: u64,
    },
}

impl CallerIdentity {
    /// Creates a user identity.
    #[must_use]
    pub const fn user(id: u64) -> Self {
        Self::User { id }
    }

    /// Creates an API token identity.
    #[must_use]
    pub const fn api_token(id: u64, project_id: u64) -> Self {
        Self::ApiToken { id, project_id }
    }

    /// Returns true for user identities.
    #[must_use]
    pub const fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// Returns the project an API token is bound to.
    #[must_use]
    pub const fn token_project_id(&self) -> Option<u64> {
        match self {
            Self::ApiToken { project_id, .. } => Some(*project_id),
            Self::User { .. } => None,
        }
    }

    /// Returns an identifier suitable for logging.
    #[must_use]
    pub fn log_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { id } => write!(f, "user:{id}"),
            Self::ApiToken { id, .. } => write!(f, "token:{id}"),
        }
    }
}
