//! # Warden Test
//!
//! Test support for services built on Warden.
//!
//! - [`fixtures`]: the seeded in-memory repository and its well-known ids
//! - [`TestClient`]: sends requests straight into an
//!   [`EndpointRegistry`](warden_server::EndpointRegistry), with the caller
//!   identity attached the way the server attaches it
//! - [`TestResponse`]: collected response with assertion helpers
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use http::{Method, StatusCode};
//! use warden_core::{EndpointDescriptor, ScopeKind, Verb};
//! use warden_middleware::{empty_response, handler_fn};
//! use warden_test::{fixtures, registry_for, TestClient};
//!
//! # tokio_test::block_on(async {
//! let repo = Arc::new(fixtures::seeded());
//! let registry = registry_for(&repo)
//!     .route(
//!         "/projects/{project_id}/clusters/{cluster_id}",
//!         EndpointDescriptor::builder(Method::POST)
//!             .verb(Verb::Create)
//!             .scopes([ScopeKind::Project, ScopeKind::Cluster]),
//!         handler_fn(|_ctx, _req| async { Ok(empty_response(StatusCode::OK)) }),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let client = TestClient::new(registry);
//! client
//!     .post("/projects/1/clusters/1")
//!     .as_user(fixtures::VIEWER_USER)
//!     .send()
//!     .await
//!     .assert_status(StatusCode::FORBIDDEN)
//!     .assert_error("Forbidden");
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/warden-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

/// Seeded in-memory repository and well-known ids.
pub mod fixtures {
    pub use warden_core::fixtures::*;
}

pub use client::{registry_for, TestClient, TestClientRequest};
pub use error::TestError;
pub use request::TestRequest;
pub use response::TestResponse;
