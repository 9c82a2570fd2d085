//! HTTP types used throughout the pipeline.

use bytes::Bytes;
use http_body_util::Full;

/// The request type seen by stages and handlers.
pub type Request = http::Request<Full<Bytes>>;

/// The response type produced by handlers and the error reporter.
pub type Response = http::Response<Full<Bytes>>;

/// Builds a response with no body.
#[must_use]
pub fn empty_response(status: http::StatusCode) -> Response {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_empty_response() {
        let response = empty_response(StatusCode::NO_CONTENT);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().is_empty());
    }
}
