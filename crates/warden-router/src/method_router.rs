//! Per-path method table.

use http::Method;

use crate::RouteError;

/// Maps HTTP methods to route values for a single path template.
///
/// # Example
///
/// ```rust
/// use warden_router::MethodRouter;
/// use http::Method;
///
/// let router = MethodRouter::new().get(1usize).post(2usize);
///
/// assert_eq!(router.value(&Method::GET), Some(&1));
/// assert_eq!(router.value(&Method::POST), Some(&2));
/// assert_eq!(router.value(&Method::DELETE), None);
/// ```
#[derive(Debug, Clone)]
pub struct MethodRouter<T> {
    routes: Vec<(Method, T)>,
}

impl<T> Default for MethodRouter<T> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<T> MethodRouter<T> {
    /// Creates an empty method table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` to `method`, replacing any previous binding.
    #[must_use]
    pub fn on(mut self, method: Method, value: T) -> Self {
        self.routes.retain(|(m, _)| *m != method);
        self.routes.push((method, value));
        self
    }

    /// Binds a GET value.
    #[must_use]
    pub fn get(self, value: T) -> Self {
        self.on(Method::GET, value)
    }

    /// Binds a POST value.
    #[must_use]
    pub fn post(self, value: T) -> Self {
        self.on(Method::POST, value)
    }

    /// Binds a PUT value.
    #[must_use]
    pub fn put(self, value: T) -> Self {
        self.on(Method::PUT, value)
    }

    /// Binds a PATCH value.
    #[must_use]
    pub fn patch(self, value: T) -> Self {
        self.on(Method::PATCH, value)
    }

    /// Binds a DELETE value.
    #[must_use]
    pub fn delete(self, value: T) -> Self {
        self.on(Method::DELETE, value)
    }

    /// Returns the value bound to `method`.
    #[must_use]
    pub fn value(&self, method: &Method) -> Option<&T> {
        self.routes
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, v)| v)
    }

    /// Returns the methods bound on this path, in registration order.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        self.routes.iter().map(|(m, _)| m.clone()).collect()
    }

    /// Returns the number of bound methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no method is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Moves every binding of `other` into `self`.
    ///
    /// Fails without modifying `self` if a method is bound on both sides.
    pub(crate) fn merge(&mut self, other: Self, path: &str) -> Result<(), RouteError> {
        if let Some((method, _)) = other.routes.iter().find(|(m, _)| self.value(m).is_some()) {
            return Err(RouteError::Duplicate {
                method: method.clone(),
                path: path.to_string(),
            });
        }
        self.routes.extend(other.routes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_replaces_binding() {
        let router = MethodRouter::new().get("a").on(Method::GET, "b");
        assert_eq!(router.value(&Method::GET), Some(&"b"));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_allowed_methods_in_order() {
        let router = MethodRouter::new().post(1).get(2).delete(3);
        assert_eq!(
            router.allowed_methods(),
            vec![Method::POST, Method::GET, Method::DELETE]
        );
    }

    #[test]
    fn test_merge_disjoint() {
        let mut router = MethodRouter::new().get(1);
        router.merge(MethodRouter::new().post(2), "/x").unwrap();
        assert_eq!(router.value(&Method::POST), Some(&2));
    }

    #[test]
    fn test_merge_duplicate_method_fails() {
        let mut router = MethodRouter::new().get(1);
        let err = router
            .merge(MethodRouter::new().get(2).post(3), "/x")
            .unwrap_err();
        assert_eq!(
            err,
            RouteError::Duplicate {
                method: Method::GET,
                path: "/x".to_string()
            }
        );
        assert!(router.value(&Method::POST).is_none());
    }
}
