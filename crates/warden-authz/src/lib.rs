//! Warden Authorization - policy loading and access evaluation
//!
//! This crate decides whether a caller may perform a request.
//!
//! # Overview
//!
//! - A [`PolicyLoader`] resolves the caller's [`PolicyDocument`]s for the
//!   requested project.
//! - The [`AccessEvaluator`] checks those documents against the request's
//!   [`ScopeChain`], one level per scope.
//!
//! Decisions are never cached; documents are loaded per request.
//!
//! # Architecture
//!
//! ```text
//!     CallerIdentity + project_id
//!                │
//!     ┌──────────▼─────────────┐
//!     │   PolicyLoader         │──── Repository
//!     └──────────┬─────────────┘
//!                │ Vec<PolicyDocument>
//!     ┌──────────▼─────────────┐
//!     │   AccessEvaluator      │◄─── ScopeChain
//!     └──────────┬─────────────┘
//!                │
//!          Decision (allow / deny at scope)
//! ```
//!
//! [`PolicyDocument`]: warden_core::PolicyDocument
//! [`ScopeChain`]: warden_core::ScopeChain

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod evaluator;
pub mod loader;

pub use error::{PolicyLoadError, PolicyLoadResult};
pub use evaluator::{AccessEvaluator, Decision};
#[cfg(any(test, feature = "test-util"))]
pub use loader::{FailingPolicyLoader, ViewerPolicyLoader};
pub use loader::{PolicyLoadOptions, PolicyLoader, RepositoryPolicyLoader};
