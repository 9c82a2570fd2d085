//! Radix tree router for Warden.
//!
//! Endpoint templates use `{name}` captures:
//!
//! ```text
//! /projects/{project_id}/clusters/{cluster_id}/apps/{namespace}/{name}
//! ```
//!
//! The router is generic over the value bound to each `(method, template)`
//! pair and reports conflicts at insertion time, so a registry built at
//! startup either fails fast or is complete.
//!
//! # Example
//!
//! ```rust
//! use warden_router::{MethodRouter, Router};
//! use http::Method;
//!
//! let mut router = Router::new();
//! router
//!     .insert(
//!         "/projects/{project_id}/clusters/{cluster_id}",
//!         MethodRouter::new().get("read_cluster").delete("delete_cluster"),
//!     )
//!     .unwrap();
//!
//! let m = router.match_route(&Method::DELETE, "/projects/1/clusters/4").unwrap();
//! assert_eq!(*m.value, "delete_cluster");
//! assert_eq!(m.params.get("cluster_id"), Some("4"));
//! ```
//!
//! # Architecture
//!
//! ```text
//!                 (root)
//!                   │
//!               "projects"
//!                   │
//!             "{project_id}"
//!                   │
//!           ┌───────┴────────┐
//!      "clusters"       "registries"
//!           │                │
//!     "{cluster_id}"   "{registry_id}"
//!      [GET,DELETE]        [GET]
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod method_router;
mod node;
mod params;
mod router;

pub use method_router::MethodRouter;
pub use node::{Node, SegmentKind};
pub use params::Params;
pub use router::{template_params, Lookup, Router};

use http::Method;
use thiserror::Error;

/// A matched route: the bound value and the captured parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a, T> {
    /// Value bound to the matched `(method, template)`.
    pub value: &'a T,
    /// Captured path parameters.
    pub params: Params,
}

impl<'a, T> RouteMatch<'a, T> {
    /// Creates a new route match.
    #[must_use]
    pub fn new(value: &'a T, params: Params) -> Self {
        Self { value, params }
    }
}

/// Errors raised while inserting templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The `(method, template)` pair is already bound.
    #[error("route {method} {path} is already registered")]
    Duplicate {
        /// Conflicting method.
        method: Method,
        /// Template being inserted.
        path: String,
    },

    /// Two templates capture the same position under different names.
    #[error("capture {{{new}}} in {path} conflicts with existing capture {{{existing}}}")]
    ParamName {
        /// Template being inserted.
        path: String,
        /// Name already registered at this position.
        existing: String,
        /// Name used by the new template.
        new: String,
    },

    /// A segment is not a literal or a well-formed `{name}` capture.
    #[error("invalid segment {segment:?} in {path}")]
    InvalidSegment {
        /// Template being inserted.
        path: String,
        /// Offending segment.
        segment: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_routing() {
        let mut router = Router::new();
        router
            .insert(
                "/projects/{project_id}/clusters/{cluster_id}",
                MethodRouter::new().post("create").get("read"),
            )
            .unwrap();
        router
            .insert(
                "/projects/{project_id}/clusters/{cluster_id}/apps/{namespace}/{name}",
                MethodRouter::new().post("deploy"),
            )
            .unwrap();

        let m = router
            .match_route(&Method::POST, "/projects/1/clusters/1/apps/default/app-1")
            .unwrap();
        assert_eq!(*m.value, "deploy");
        assert_eq!(m.params.get("namespace"), Some("default"));
        assert_eq!(m.params.get("name"), Some("app-1"));

        assert!(router.match_route(&Method::DELETE, "/projects/1/clusters/1").is_none());
    }

    #[test]
    fn test_error_display() {
        let err = RouteError::ParamName {
            path: "/projects/{id}".to_string(),
            existing: "project_id".to_string(),
            new: "id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "capture {id} in /projects/{id} conflicts with existing capture {project_id}"
        );
    }
}
