//! # Warden Server
//!
//! HTTP front end for the Warden request pipeline.
//!
//! - [`EndpointRegistry`] validates endpoint declarations at startup and
//!   dispatches each request through its endpoint's pipeline
//! - [`Server`] accepts HTTP/1.1 connections, identifies the caller and
//!   cancels requests on client disconnect or shutdown
//! - [`ConnectionTracker`] bounds open connections and drains them on
//!   shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use http::{Method, StatusCode};
//! use warden_authz::RepositoryPolicyLoader;
//! use warden_config::ServerConfig;
//! use warden_core::{fixtures, EndpointDescriptor, ScopeKind, Verb};
//! use warden_middleware::{empty_response, handler_fn};
//! use warden_server::{EndpointRegistry, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = Arc::new(fixtures::seeded());
//!     let config = ServerConfig::default();
//!     let registry = EndpointRegistry::builder(repo.clone(), Arc::new(RepositoryPolicyLoader::new(repo)))
//!         .request_timeout(config.request_timeout())
//!         .route(
//!             "/projects/{project_id}/clusters/{cluster_id}",
//!             EndpointDescriptor::builder(Method::DELETE)
//!                 .verb(Verb::Delete)
//!                 .scopes([ScopeKind::Project, ScopeKind::Cluster]),
//!             handler_fn(|_ctx, _req| async { Ok(empty_response(StatusCode::NO_CONTENT)) }),
//!         )
//!         .build()?;
//!
//!     Server::new(config, registry).run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/warden-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod identity;
mod registry;
mod server;
mod shutdown;

pub use error::{RegistrationError, ServerError};
pub use identity::{
    IdentityExtractor, TrustedHeaderIdentity, TOKEN_ID_HEADER, TOKEN_PROJECT_HEADER, USER_ID_HEADER,
};
pub use registry::{EndpointRegistry, EndpointRegistryBuilder, REQUEST_ID_HEADER};
pub use server::Server;
pub use shutdown::{shutdown_on_signal, ConnectionToken, ConnectionTracker};
