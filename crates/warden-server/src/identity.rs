//! Caller identity extraction.
//!
//! Warden does not authenticate. An upstream proxy verifies credentials and
//! forwards the caller in trusted headers; an [`IdentityExtractor`] turns
//! those into a [`CallerIdentity`] before the pipeline runs.

use std::fmt;

use http::request::Parts;
use warden_core::{ApiError, ApiResult, CallerIdentity};

/// Header carrying an authenticated user id.
pub const USER_ID_HEADER: &str = "x-warden-user-id";
/// Header carrying an API token id.
pub const TOKEN_ID_HEADER: &str = "x-warden-token-id";
/// Header carrying the project an API token is bound to.
pub const TOKEN_PROJECT_HEADER: &str = "x-warden-token-project-id";

/// Produces the caller identity for a request.
///
/// `Ok(None)` means the request is anonymous; the policy stage rejects it.
pub trait IdentityExtractor: Send + Sync + fmt::Debug {
    /// Reads the identity from the request head.
    fn extract(&self, parts: &Parts) -> ApiResult<Option<CallerIdentity>>;
}

/// Reads the identity from headers set by an authenticating proxy.
///
/// A token id without its project id, or both a user and a token, is a bad
/// request.
///
/// # Example
///
/// ```
/// use warden_core::CallerIdentity;
/// use warden_server::{IdentityExtractor, TrustedHeaderIdentity};
///
/// let (parts, ()) = http::Request::builder()
///     .header("x-warden-user-id", "7")
///     .body(())
///     .unwrap()
///     .into_parts();
///
/// let identity = TrustedHeaderIdentity.extract(&parts).unwrap();
/// assert_eq!(identity, Some(CallerIdentity::user(7)));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedHeaderIdentity;

impl IdentityExtractor for TrustedHeaderIdentity {
    fn extract(&self, parts: &Parts) -> ApiResult<Option<CallerIdentity>> {
        let user = header_id(parts, USER_ID_HEADER)?;
        let token = header_id(parts, TOKEN_ID_HEADER)?;
        let token_project = header_id(parts, TOKEN_PROJECT_HEADER)?;

        match (user, token, token_project) {
            (None, None, None) => Ok(None),
            (Some(id), None, None) => Ok(Some(CallerIdentity::user(id))),
            (None, Some(id), Some(project_id)) => Ok(Some(CallerIdentity::api_token(id, project_id))),
            (None, Some(_), None) => Err(ApiError::bad_request(format!(
                "{TOKEN_ID_HEADER} requires {TOKEN_PROJECT_HEADER}"
            ))),
            _ => Err(ApiError::bad_request("conflicting identity headers")),
        }
    }
}

fn header_id(parts: &Parts, name: &str) -> ApiResult<Option<u64>> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| ApiError::bad_request(format!("invalid {name} header")))
}
