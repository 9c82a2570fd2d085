//! Policy documents.
//!
//! A [`PolicyDocument`] is a tree that mirrors the scope-parent tree. Each
//! node grants a set of verbs on the resources its filter matches, and its
//! children narrow the grant for descendant scopes. Evaluation lives in
//! `warden-authz`; this module only defines the data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::scope::{ResourceId, ScopeKind, Verb};

/// Which resources a policy node applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ResourceFilter {
    /// Every resource of the node's kind.
    #[default]
    Any,
    /// A single resource.
    Id(ResourceId),
    /// A set of resources.
    Set(Vec<ResourceId>),
}

impl ResourceFilter {
    /// Returns true if the filter admits `id`.
    #[must_use]
    pub fn matches(&self, id: &ResourceId) -> bool {
        match self {
            Self::Any => true,
            Self::Id(expected) => expected.same_resource(id),
            Self::Set(ids) => ids.iter().any(|candidate| candidate.same_resource(id)),
        }
    }

    /// Ranks filters by how narrowly they select; higher is narrower.
    #[must_use]
    pub const fn specificity(&self) -> u8 {
        match self {
            Self::Any => 0,
            Self::Set(_) => 1,
            Self::Id(_) => 2,
        }
    }
}

/// A node in a policy tree.
///
/// # Example
///
/// ```
/// use warden_core::{PolicyDocument, ResourceFilter, ScopeKind, Verb};
///
/// // Read-write on project 1, but cluster 4 is read-only.
/// let doc = PolicyDocument::builder(ScopeKind::Project)
///     .resources(ResourceFilter::Id(1u64.into()))
///     .verbs(Verb::ALL)
///     .child(
///         PolicyDocument::builder(ScopeKind::Cluster)
///             .resources(ResourceFilter::Id(4u64.into()))
///             .verbs(Verb::READ_ONLY)
///             .build(),
///     )
///     .build();
///
/// assert!(doc.grants(Verb::Delete));
/// assert!(!doc.children[0].grants(Verb::Delete));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Scope kind this node applies to.
    pub scope: ScopeKind,
    /// Resources of that kind the node applies to.
    #[serde(default)]
    pub resources: ResourceFilter,
    /// Verbs granted on matching resources.
    #[serde(default)]
    pub verbs: BTreeSet<Verb>,
    /// Narrowing grants for child scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PolicyDocument>,
}

impl PolicyDocument {
    /// Starts building a node for `scope`.
    #[must_use]
    pub fn builder(scope: ScopeKind) -> PolicyDocumentBuilder {
        PolicyDocumentBuilder::new(scope)
    }

    /// Returns true if this node grants `verb`.
    #[must_use]
    pub fn grants(&self, verb: Verb) -> bool {
        self.verbs.contains(&verb)
    }

    /// Returns true if this node has children of `kind`.
    #[must_use]
    pub fn has_children_of(&self, kind: ScopeKind) -> bool {
        self.children.iter().any(|c| c.scope == kind)
    }

    /// Iterates over children of `kind`.
    pub fn children_of(&self, kind: ScopeKind) -> impl Iterator<Item = &Self> {
        self.children.iter().filter(move |c| c.scope == kind)
    }

    /// Full access to a project and everything beneath it.
    #[must_use]
    pub fn admin(project_id: u64) -> Self {
        Self::builder(ScopeKind::Project)
            .resources(ResourceFilter::Id(project_id.into()))
            .verbs(Verb::ALL)
            .build()
    }

    /// Full access except invites, which are read-only.
    #[must_use]
    pub fn developer(project_id: u64) -> Self {
        Self::builder(ScopeKind::Project)
            .resources(ResourceFilter::Id(project_id.into()))
            .verbs(Verb::ALL)
            .child(
                Self::builder(ScopeKind::Invite)
                    .verbs(Verb::READ_ONLY)
                    .build(),
            )
            .build()
    }

    /// Read-only access to a project; invites are hidden.
    #[must_use]
    pub fn viewer(project_id: u64) -> Self {
        Self::builder(ScopeKind::Project)
            .resources(ResourceFilter::Id(project_id.into()))
            .verbs(Verb::READ_ONLY)
            .child(Self::builder(ScopeKind::Invite).build())
            .build()
    }
}

/// Builder for [`PolicyDocument`].
#[derive(Debug, Clone)]
pub struct PolicyDocumentBuilder {
    doc: PolicyDocument,
}

impl PolicyDocumentBuilder {
    fn new(scope: ScopeKind) -> Self {
        Self {
            doc: PolicyDocument {
                scope,
                resources: ResourceFilter::Any,
                verbs: BTreeSet::new(),
                children: Vec::new(),
            },
        }
    }

    /// Sets the resource filter.
    pub fn resources(mut self, filter: ResourceFilter) -> Self {
        self.doc.resources = filter;
        self
    }

    /// Adds verbs to the granted set.
    pub fn verbs(mut self, verbs: impl IntoIterator<Item = Verb>) -> Self {
        self.doc.verbs.extend(verbs);
        self
    }

    /// Adds a child node.
    pub fn child(mut self, child: PolicyDocument) -> Self {
        self.doc.children.push(child);
        self
    }

    /// Finishes the node.
    pub fn build(self) -> PolicyDocument {
        self.doc
    }
}
