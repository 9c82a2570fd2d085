//! Radix tree node implementation.
//!
//! Each node owns one path segment. Static children are kept sorted for
//! binary search; a node has at most one parameter child, and every
//! template that passes through that position must use the same name.

use crate::method_router::MethodRouter;
use crate::params::Params;
use crate::RouteError;

/// Kind of a template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Literal segment (e.g. `projects`).
    Static,
    /// Named capture (e.g. `{project_id}`).
    Param(String),
}

/// A node in the radix tree.
#[derive(Debug, Clone)]
pub struct Node<T> {
    /// The literal segment, or `{name}` for captures.
    pub segment: String,

    /// Segment kind.
    pub kind: SegmentKind,

    /// Methods bound when a template ends at this node.
    pub methods: Option<MethodRouter<T>>,

    /// Static children, sorted by segment.
    pub static_children: Vec<Node<T>>,

    /// Capture child.
    pub param_child: Option<Box<Node<T>>>,
}

impl<T> Node<T> {
    fn with_kind(segment: String, kind: SegmentKind) -> Self {
        Self {
            segment,
            kind,
            methods: None,
            static_children: Vec::new(),
            param_child: None,
        }
    }

    /// Creates the root node.
    #[must_use]
    pub fn root() -> Self {
        Self::with_kind(String::new(), SegmentKind::Static)
    }

    /// Inserts `methods` under the template `path`.
    pub fn insert(&mut self, path: &str, methods: MethodRouter<T>) -> Result<(), RouteError> {
        let segments = parse_template(path)?;
        self.insert_segments(&segments, methods, path)
    }

    fn insert_segments(
        &mut self,
        segments: &[(String, SegmentKind)],
        methods: MethodRouter<T>,
        path: &str,
    ) -> Result<(), RouteError> {
        let Some(((segment, kind), remaining)) = segments.split_first() else {
            return match &mut self.methods {
                Some(existing) => existing.merge(methods, path),
                None => {
                    self.methods = Some(methods);
                    Ok(())
                }
            };
        };

        match kind {
            SegmentKind::Static => {
                match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(segment))
                {
                    Ok(i) => self.static_children[i].insert_segments(remaining, methods, path),
                    Err(i) => {
                        let mut child = Self::with_kind(segment.clone(), SegmentKind::Static);
                        child.insert_segments(remaining, methods, path)?;
                        self.static_children.insert(i, child);
                        Ok(())
                    }
                }
            }
            SegmentKind::Param(name) => {
                if let Some(child) = &mut self.param_child {
                    if let SegmentKind::Param(existing) = &child.kind {
                        if existing != name {
                            return Err(RouteError::ParamName {
                                path: path.to_string(),
                                existing: existing.clone(),
                                new: name.clone(),
                            });
                        }
                    }
                    return child.insert_segments(remaining, methods, path);
                }
                let mut child = Self::with_kind(segment.clone(), kind.clone());
                child.insert_segments(remaining, methods, path)?;
                self.param_child = Some(Box::new(child));
                Ok(())
            }
        }
    }

    /// Matches a concrete path, returning the bound methods and captures.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&MethodRouter<T>, Params)> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();
        let methods = self.match_segments(&segments, &mut params)?;
        Some((methods, params))
    }

    fn match_segments<'a>(
        &'a self,
        segments: &[&str],
        params: &mut Params,
    ) -> Option<&'a MethodRouter<T>> {
        let Some((segment, remaining)) = segments.split_first() else {
            return self.methods.as_ref();
        };

        // Literal segments win over captures.
        if let Some(child) = self.find_static_child(segment) {
            if let Some(found) = child.match_segments(remaining, params) {
                return Some(found);
            }
        }

        if let Some(child) = &self.param_child {
            if let SegmentKind::Param(name) = &child.kind {
                let mark = params.len();
                params.push(name.clone(), *segment);
                if let Some(found) = child.match_segments(remaining, params) {
                    return Some(found);
                }
                params.truncate(mark);
            }
        }

        None
    }

    fn find_static_child(&self, segment: &str) -> Option<&Self> {
        self.static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
            .ok()
            .map(|i| &self.static_children[i])
    }
}

/// Splits a template into typed segments.
pub(crate) fn parse_template(path: &str) -> Result<Vec<(String, SegmentKind)>, RouteError> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if let Some(inner) = s.strip_prefix('{') {
                match inner.strip_suffix('}') {
                    Some(name) if is_param_name(name) => {
                        Ok((s.to_string(), SegmentKind::Param(name.to_string())))
                    }
                    _ => Err(RouteError::InvalidSegment {
                        path: path.to_string(),
                        segment: s.to_string(),
                    }),
                }
            } else if s.contains('{') || s.contains('}') {
                Err(RouteError::InvalidSegment {
                    path: path.to_string(),
                    segment: s.to_string(),
                })
            } else {
                Ok((s.to_string(), SegmentKind::Static))
            }
        })
        .collect()
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_parse_template() {
        let segments = parse_template("/projects/{project_id}/clusters").unwrap();
        assert_eq!(
            segments,
            vec![
                ("projects".to_string(), SegmentKind::Static),
                (
                    "{project_id}".to_string(),
                    SegmentKind::Param("project_id".to_string())
                ),
                ("clusters".to_string(), SegmentKind::Static),
            ]
        );
    }

    #[test]
    fn test_parse_template_rejects_malformed_capture() {
        assert!(parse_template("/projects/{}").is_err());
        assert!(parse_template("/projects/{project_id").is_err());
        assert!(parse_template("/projects/x{id}").is_err());
        assert!(parse_template("/projects/{project-id}").is_err());
    }

    #[test]
    fn test_insert_and_match_params() {
        let mut root = Node::root();
        root.insert(
            "/projects/{project_id}/clusters/{cluster_id}",
            MethodRouter::new().post("create_cluster"),
        )
        .unwrap();

        let (methods, params) = root.match_path("/projects/1/clusters/9").unwrap();
        assert_eq!(methods.value(&Method::POST), Some(&"create_cluster"));
        assert_eq!(params.get("project_id"), Some("1"));
        assert_eq!(params.get("cluster_id"), Some("9"));
    }

    #[test]
    fn test_static_priority_over_param() {
        let mut root = Node::root();
        root.insert("/projects/{project_id}/clusters/{cluster_id}", MethodRouter::new().get("cluster"))
            .unwrap();
        root.insert("/projects/{project_id}/clusters/candidates", MethodRouter::new().get("candidates"))
            .unwrap();

        let (methods, params) = root.match_path("/projects/1/clusters/candidates").unwrap();
        assert_eq!(methods.value(&Method::GET), Some(&"candidates"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_param_fallback_after_static_miss() {
        let mut root = Node::root();
        root.insert("/projects/{project_id}/infra/latest", MethodRouter::new().get("latest"))
            .unwrap();
        root.insert("/projects/{project_id}/infra/{infra_id}/operations", MethodRouter::new().get("ops"))
            .unwrap();

        // "latest" matches statically first, dead-ends, then falls back to the capture.
        let (methods, params) = root
            .match_path("/projects/3/infra/latest/operations")
            .unwrap();
        assert_eq!(methods.value(&Method::GET), Some(&"ops"));
        assert_eq!(params.get("infra_id"), Some("latest"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_conflicting_param_names() {
        let mut root = Node::root();
        root.insert("/projects/{project_id}", MethodRouter::new().get(1)).unwrap();
        let err = root
            .insert("/projects/{id}/clusters", MethodRouter::new().get(2))
            .unwrap_err();
        assert!(matches!(err, RouteError::ParamName { .. }));
    }

    #[test]
    fn test_no_match() {
        let mut root = Node::root();
        root.insert("/projects/{project_id}", MethodRouter::new().get(1)).unwrap();
        assert!(root.match_path("/clusters/1").is_none());
        assert!(root.match_path("/projects").is_none());
    }
}
