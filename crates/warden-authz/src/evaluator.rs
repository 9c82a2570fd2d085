//! Access evaluation.
//!
//! The evaluator walks every policy document alongside the scope chain,
//! level by level. At each level it picks the document node that applies to
//! the chain entry and checks the entry's verb against that node's verb set.
//!
//! - A node without children of the next scope kind lends its grant to
//!   every deeper level.
//! - A node with such children narrows: only children whose filter admits the
//!   next identifier apply, and among those the most specific filter wins
//!   (`Id` over `Set` over `Any`). No admitting child means no grant below.
//! - Documents combine by union per level. The request is permitted iff
//!   every level is granted by at least one document.

use std::collections::BTreeSet;

use tracing::{debug, instrument};
use warden_core::{PolicyDocument, ScopeChain, ScopeKind, Verb};

/// Outcome of an access evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is permitted.
    pub allowed: bool,
    /// The first chain level no document granted.
    pub denied_at: Option<ScopeKind>,
}

impl Decision {
    /// A permitting decision.
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            denied_at: None,
        }
    }

    /// A denying decision at `scope`.
    #[must_use]
    pub const fn deny(scope: Option<ScopeKind>) -> Self {
        Self {
            allowed: false,
            denied_at: scope,
        }
    }

    /// Returns the metric label for this decision.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        if self.allowed {
            "allow"
        } else {
            "deny"
        }
    }
}

/// Evaluates policy documents against scope chains.
///
/// Stateless; one instance is shared by every endpoint.
///
/// # Example
///
/// ```
/// use warden_authz::AccessEvaluator;
/// use warden_core::{PolicyDocument, RequestAction, ScopeChain, ScopeKind, Verb};
///
/// let chain: ScopeChain = [
///     (ScopeKind::Project, RequestAction::new(Verb::Create, 1u64)),
///     (ScopeKind::Cluster, RequestAction::new(Verb::Create, 1u64)),
/// ]
/// .into_iter()
/// .collect();
///
/// let evaluator = AccessEvaluator::new();
/// assert!(evaluator.evaluate(&[PolicyDocument::admin(1)], &chain).allowed);
/// assert!(!evaluator.evaluate(&[PolicyDocument::viewer(1)], &chain).allowed);
/// assert!(!evaluator.evaluate(&[], &chain).allowed);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessEvaluator;

impl AccessEvaluator {
    /// Creates an evaluator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decides whether `documents` permit every action in `chain`.
    #[instrument(level = "debug", skip_all, fields(documents = documents.len(), levels = chain.len()))]
    pub fn evaluate(&self, documents: &[PolicyDocument], chain: &ScopeChain) -> Decision {
        if chain.is_empty() {
            debug!("empty scope chain");
            return Decision::deny(None);
        }

        let mut granted = vec![false; chain.len()];
        for document in documents {
            for (level, verbs) in effective_grants(document, chain).into_iter().enumerate() {
                if let (Some(verbs), Some((_, action))) = (verbs, chain.get_index(level)) {
                    granted[level] |= verbs.contains(&action.verb);
                }
            }
        }

        match granted.iter().position(|g| !g) {
            None => Decision::allow(),
            Some(level) => {
                let scope = chain.get_index(level).map(|(kind, _)| kind);
                debug!(denied_at = ?scope, "no document grants level");
                Decision::deny(scope)
            }
        }
    }
}

/// Returns, for each chain level, the verb set `document` applies there.
///
/// `None` means the document does not reach that level.
fn effective_grants<'a>(
    document: &'a PolicyDocument,
    chain: &ScopeChain,
) -> Vec<Option<&'a BTreeSet<Verb>>> {
    let mut grants = Vec::with_capacity(chain.len());
    let mut entries = chain.iter();

    let Some((root_kind, root_action)) = entries.next() else {
        return grants;
    };
    if document.scope != root_kind || !document.resources.matches(&root_action.id) {
        grants.resize(chain.len(), None);
        return grants;
    }

    let mut current = Some(document);
    let mut inherited: Option<&BTreeSet<Verb>> = None;
    grants.push(Some(&document.verbs));

    for (kind, action) in entries {
        if let Some(verbs) = inherited {
            grants.push(Some(verbs));
            continue;
        }
        let Some(node) = current else {
            grants.push(None);
            continue;
        };

        if node.has_children_of(kind) {
            current = most_specific(node, kind, &action.id);
            grants.push(current.map(|n| &n.verbs));
        } else {
            inherited = Some(&node.verbs);
            grants.push(inherited);
        }
    }
    grants
}

fn most_specific<'a>(
    node: &'a PolicyDocument,
    kind: ScopeKind,
    id: &warden_core::ResourceId,
) -> Option<&'a PolicyDocument> {
    node.children_of(kind)
        .filter(|child| child.resources.matches(id))
        .max_by_key(|child| child.resources.specificity())
}
