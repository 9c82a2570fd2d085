//! High-level router API.

use http::Method;

use crate::method_router::MethodRouter;
use crate::node::{parse_template, Node, SegmentKind};
use crate::params::Params;
use crate::{RouteError, RouteMatch};

/// Radix tree router generic over the value bound to each route.
///
/// The endpoint registry binds endpoint indices; tests bind plain strings.
///
/// # Example
///
/// ```rust
/// use warden_router::{Lookup, Router};
/// use http::Method;
///
/// let mut router = Router::new();
/// router.route(Method::POST, "/projects/{project_id}/clusters/{cluster_id}", 0usize).unwrap();
///
/// match router.lookup(&Method::POST, "/projects/1/clusters/2") {
///     Lookup::Found(m) => {
///         assert_eq!(*m.value, 0);
///         assert_eq!(m.params.get("cluster_id"), Some("2"));
///     }
///     _ => unreachable!(),
/// }
/// ```
///
/// # Route Priority
///
/// Literal segments are tried before captures, so
/// `/projects/{project_id}/clusters/candidates` wins over
/// `/projects/{project_id}/clusters/{cluster_id}` for that exact path.
#[derive(Debug, Clone)]
pub struct Router<T> {
    root: Node<T>,
    route_count: usize,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`Router::lookup`].
#[derive(Debug)]
pub enum Lookup<'a, T> {
    /// Path and method matched.
    Found(RouteMatch<'a, T>),
    /// Path matched but the method is not bound; carries the bound methods.
    MethodNotAllowed(Vec<Method>),
    /// No template matches the path.
    NotFound,
}

impl<T> Router<T> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            route_count: 0,
        }
    }

    /// Inserts a method table under `path`.
    ///
    /// Fails if the template is malformed, reuses a bound `(method, path)`
    /// pair, or names a capture differently from an existing template at the
    /// same position.
    pub fn insert(&mut self, path: &str, methods: MethodRouter<T>) -> Result<(), RouteError> {
        let added = methods.len();
        self.root.insert(path, methods)?;
        self.route_count += added;
        Ok(())
    }

    /// Binds a single method on `path`.
    pub fn route(&mut self, method: Method, path: &str, value: T) -> Result<(), RouteError> {
        self.insert(path, MethodRouter::new().on(method, value))
    }

    /// Matches a method and path.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, T> {
        match self.root.match_path(path) {
            Some((methods, params)) => match methods.value(method) {
                Some(value) => Lookup::Found(RouteMatch::new(value, params)),
                None => Lookup::MethodNotAllowed(methods.allowed_methods()),
            },
            None => Lookup::NotFound,
        }
    }

    /// Matches a method and path, ignoring the 404/405 distinction.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, T>> {
        match self.lookup(method, path) {
            Lookup::Found(m) => Some(m),
            _ => None,
        }
    }

    /// Matches a path regardless of method.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&MethodRouter<T>, Params)> {
        self.root.match_path(path)
    }

    /// Returns the number of `(method, template)` bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}

/// Returns the capture names of a template, in order.
///
/// # Example
///
/// ```rust
/// let names = warden_router::template_params("/projects/{project_id}/clusters/{cluster_id}").unwrap();
/// assert_eq!(names, vec!["project_id", "cluster_id"]);
/// ```
pub fn template_params(path: &str) -> Result<Vec<String>, RouteError> {
    Ok(parse_template(path)?
        .into_iter()
        .filter_map(|(_, kind)| match kind {
            SegmentKind::Param(name) => Some(name),
            SegmentKind::Static => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTER: &str = "/projects/{project_id}/clusters/{cluster_id}";

    #[test]
    fn test_router_new() {
        let router: Router<usize> = Router::new();
        assert!(router.is_empty());
    }

    #[test]
    fn test_route_counts_bindings() {
        let mut router = Router::new();
        router
            .insert(CLUSTER, MethodRouter::new().get(0).delete(1))
            .unwrap();
        router.route(Method::POST, CLUSTER, 2).unwrap();
        assert_eq!(router.len(), 3);
    }

    #[test]
    fn test_lookup_found() {
        let mut router = Router::new();
        router.route(Method::GET, CLUSTER, "get_cluster").unwrap();

        let Lookup::Found(m) = router.lookup(&Method::GET, "/projects/1/clusters/2") else {
            panic!("expected match");
        };
        assert_eq!(*m.value, "get_cluster");
        assert_eq!(m.params.get("project_id"), Some("1"));
        assert_eq!(m.params.get("cluster_id"), Some("2"));
    }

    #[test]
    fn test_lookup_method_not_allowed() {
        let mut router = Router::new();
        router.route(Method::GET, CLUSTER, 0).unwrap();

        match router.lookup(&Method::PATCH, "/projects/1/clusters/2") {
            Lookup::MethodNotAllowed(allowed) => assert_eq!(allowed, vec![Method::GET]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_lookup_not_found() {
        let mut router = Router::new();
        router.route(Method::GET, CLUSTER, 0).unwrap();
        assert!(matches!(
            router.lookup(&Method::GET, "/projects/1/registries/2"),
            Lookup::NotFound
        ));
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let mut router = Router::new();
        router.route(Method::POST, CLUSTER, 0).unwrap();
        let err = router.route(Method::POST, CLUSTER, 1).unwrap_err();
        assert!(matches!(err, RouteError::Duplicate { .. }));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_template_params() {
        assert_eq!(
            template_params("/projects/{project_id}/clusters/{cluster_id}/apps/{namespace}/{name}")
                .unwrap(),
            vec!["project_id", "cluster_id", "namespace", "name"]
        );
        assert!(template_params("/projects").unwrap().is_empty());
    }
}
