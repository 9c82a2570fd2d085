//! # Warden Middleware
//!
//! The request pipeline that scopes and authorizes every Warden endpoint.
//!
//! Each endpoint gets a fixed chain of stages composed from its
//! [`EndpointDescriptor`](warden_core::EndpointDescriptor):
//!
//! ```text
//! Request -> ScopeResolver -> Policy -> Hydrate(project) -> .. -> Hydrate(leaf) -> Gates -> Handler
//!                                   \________________ any failure ________________/
//!                                                        |
//!                                                  ErrorReporter -> Response
//! ```
//!
//! | Stage          | Purpose                                               |
//! |----------------|-------------------------------------------------------|
//! | Scope resolver | Parse URL ids into the request's scope chain          |
//! | Policy         | Load the caller's documents, evaluate the chain       |
//! | Hydrate        | Load each declared scope's record under its parent    |
//! | Feature gate   | Deny when a hydrated resource has a feature disabled  |
//!
//! Stages are sequential and never spawn. Each stage receives the context by
//! value and passes a new one on, so a handler only ever sees a context that
//! went through every stage. A failing stage returns a [`PipelineError`]
//! and the [`ErrorReporter`] turns it into the response.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use http::Method;
//! use warden_authz::RepositoryPolicyLoader;
//! use warden_core::{fixtures, Cluster, EndpointDescriptor, ScopeKind, Verb};
//! use warden_middleware::{empty_response, handler_fn, Pipeline};
//!
//! let repo = Arc::new(fixtures::seeded());
//! let descriptor = EndpointDescriptor::builder(Method::GET)
//!     .verb(Verb::Read)
//!     .scopes([ScopeKind::Project, ScopeKind::Cluster])
//!     .build()
//!     .unwrap();
//!
//! let pipeline = Pipeline::for_endpoint(
//!     &descriptor,
//!     repo.clone(),
//!     Arc::new(RepositoryPolicyLoader::new(repo)),
//!     handler_fn(|ctx, _req| async move {
//!         let _cluster = ctx.get::<Cluster>();
//!         Ok(empty_response(http::StatusCode::OK))
//!     }),
//! );
//! assert_eq!(pipeline.stage_count(), 4);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod middleware;
pub mod pipeline;
pub mod reporter;
pub mod stages;
pub mod types;

pub use middleware::{handler_fn, BoxFuture, Handler, Middleware, Next, PipelineError, PipelineResult};
pub use pipeline::{BoxedMiddleware, Pipeline};
pub use reporter::{Alerter, ErrorReporter, RequestMeta, TracingAlerter};
pub use stages::{GateStage, HydrateStage, PolicyStage, ScopeResolverStage};
pub use types::{empty_response, Request, Response};
