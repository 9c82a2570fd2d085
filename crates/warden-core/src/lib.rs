//! # Warden Core
//!
//! Core types for the Warden authorization pipeline.
//!
//! This crate provides the vocabulary every other Warden crate speaks:
//!
//! - [`ScopeKind`], [`Verb`], [`ResourceId`] and [`ScopeChain`] - what a request touches
//! - [`EndpointDescriptor`] - the static declaration attached to each route
//! - [`PolicyDocument`] - hierarchical verb grants
//! - [`CallerIdentity`] - the authenticated principal
//! - [`RequestContext`] - immutable per-request state with cancellation
//! - [`UrlParams`] - typed path parameter extraction
//! - [`Repository`] - the storage interface hydrators read through
//! - [`ApiError`] - the error taxonomy rendered by the reporter

#![doc(html_root_url = "https://docs.rs/warden-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod endpoint;
mod error;
mod extract;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;
mod identity;
mod policy;
pub mod repository;
pub mod resource;
mod scope;

pub use context::{PipelineState, RequestContext, RequestId};
pub use endpoint::{DescriptorError, EndpointDescriptor, EndpointDescriptorBuilder, FeatureGate};
pub use error::{
    ApiError, ApiResult, CancelReason, ErrorBody, ErrorKind, CLIENT_CLOSED_REQUEST,
    FORBIDDEN_MESSAGE, INTERNAL_MESSAGE,
};
pub use extract::UrlParams;
pub use identity::CallerIdentity;
pub use policy::{PolicyDocument, PolicyDocumentBuilder, ResourceFilter};
pub use repository::{Repository, RepositoryError, RepositoryResult};
pub use resource::{
    ApiContractRevision, ApiToken, Cluster, DeploymentTarget, GitInstallation,
    GitlabIntegration, HelmRepo, Infra, Invite, LoadedResource, Namespace, Operation, Project,
    Registry, Release, ScopedResource, Stack,
};
pub use scope::{IdKind, RequestAction, ResourceId, ScopeChain, ScopeKind, Verb};
