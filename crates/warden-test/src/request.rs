//! Test request building.

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use http_body_util::Full;
use serde::Serialize;
use uuid::Uuid;
use warden_core::CallerIdentity;
use warden_server::REQUEST_ID_HEADER;

use crate::error::TestError;

/// Builder for requests sent through a [`TestClient`](crate::TestClient).
///
/// The caller identity is attached as a request extension, the way the
/// server does after reading trusted headers.
#[must_use]
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    uri: String,
    headers: HeaderMap,
    identity: Option<CallerIdentity>,
    body: Bytes,
}

impl TestRequest {
    /// Starts a request.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            identity: None,
            body: Bytes::new(),
        }
    }

    /// Starts a GET request.
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Method::DELETE, uri)
    }

    /// Sets a header.
    ///
    /// # Panics
    ///
    /// Panics if the name or value is not a valid header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = HeaderName::try_from(name.as_ref()).expect("valid header name");
        let value = HeaderValue::try_from(value.as_ref()).expect("valid header value");
        self.headers.insert(name, value);
        self
    }

    /// Sets the request ID header.
    pub fn request_id(self, id: Uuid) -> Self {
        self.header(REQUEST_ID_HEADER, id.to_string())
    }

    /// Sends the request as `identity`.
    pub fn identity(mut self, identity: CallerIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Sends the request as user `user_id`.
    pub fn as_user(self, user_id: u64) -> Self {
        self.identity(CallerIdentity::user(user_id))
    }

    /// Sends the request as API token `token_id` bound to `project_id`.
    pub fn as_token(self, token_id: u64, project_id: u64) -> Self {
        self.identity(CallerIdentity::api_token(token_id, project_id))
    }

    /// Sends the request without an identity.
    pub fn anonymous(mut self) -> Self {
        self.identity = None;
        self
    }

    /// Returns the identity the request is sent as.
    #[must_use]
    pub const fn caller(&self) -> Option<&CallerIdentity> {
        self.identity.as_ref()
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and content type.
    pub fn json<T: Serialize>(mut self, value: &T) -> Result<Self, TestError> {
        self.body = Bytes::from(serde_json::to_vec(value)?);
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }

    /// Converts into an HTTP request.
    pub fn build(self) -> Result<http::Request<Full<Bytes>>, TestError> {
        let mut builder = http::Request::builder().method(self.method).uri(self.uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers);
        }
        if let Some(identity) = self.identity {
            builder = builder.extension(identity);
        }
        Ok(builder.body(Full::new(self.body))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_in_extensions() {
        let request = TestRequest::get("/projects/1").as_user(7).build().unwrap();
        assert_eq!(
            request.extensions().get::<CallerIdentity>(),
            Some(&CallerIdentity::user(7))
        );
    }

    #[test]
    fn test_anonymous_has_no_identity() {
        let request = TestRequest::get("/projects/1")
            .as_token(20, 1)
            .anonymous()
            .build()
            .unwrap();
        assert!(request.extensions().get::<CallerIdentity>().is_none());
    }

    #[test]
    fn test_json_sets_content_type() {
        let request = TestRequest::post("/projects/1/clusters")
            .json(&json!({"name": "edge"}))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_invalid_uri() {
        let err = TestRequest::get("not a uri").build().unwrap_err();
        assert!(matches!(err, TestError::RequestBuild(_)));
    }
}
