//! Scope kinds, verbs, resource identifiers and scope chains.
//!
//! [`ScopeKind`] is a closed enumeration. Everything a kind declares (its
//! parent, the URL parameter it reads, the shape of its identifier) comes
//! from a `match` in this module, so adding a kind is a compile error until
//! every table is updated.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A protected resource class.
///
/// Kinds form a tree rooted at [`ScopeKind::Project`]:
///
/// ```text
/// Project
/// ├── Cluster
/// │   └── Namespace
/// │       ├── Release
/// │       └── Stack
/// ├── Registry
/// ├── HelmRepo
/// ├── GitInstallation
/// ├── GitlabIntegration
/// ├── Infra
/// │   └── Operation
/// ├── Invite
/// ├── DeploymentTarget
/// └── ApiContractRevision
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// A tenant project.
    Project,
    /// A Kubernetes cluster connected to a project.
    Cluster,
    /// A container registry integration.
    Registry,
    /// A Helm chart repository.
    HelmRepo,
    /// A GitHub app installation.
    GitInstallation,
    /// A GitLab instance integration.
    GitlabIntegration,
    /// Provisioned infrastructure.
    Infra,
    /// A provisioning operation on an infra.
    Operation,
    /// A namespace inside a cluster.
    Namespace,
    /// A Helm release inside a namespace.
    Release,
    /// An application stack inside a namespace.
    Stack,
    /// A pending project invitation.
    Invite,
    /// A deployment target (cluster + namespace selector).
    DeploymentTarget,
    /// A revision of an API contract.
    ApiContractRevision,
}

/// Shape of a scope's identifier in the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    /// Base-10 unsigned 64-bit integer.
    Uint,
    /// Non-empty identifier string.
    Name,
    /// Canonical hyphenated UUID.
    Uuid,
}

impl IdKind {
    /// Returns the name used in parameter error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uint => "uint",
            Self::Name => "string",
            Self::Uuid => "uuid",
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScopeKind {
    /// Every scope kind, parents before children.
    pub const ALL: [Self; 14] = [
        Self::Project,
        Self::Cluster,
        Self::Registry,
        Self::HelmRepo,
        Self::GitInstallation,
        Self::GitlabIntegration,
        Self::Infra,
        Self::Invite,
        Self::DeploymentTarget,
        Self::ApiContractRevision,
        Self::Namespace,
        Self::Operation,
        Self::Release,
        Self::Stack,
    ];

    /// Returns the parent kind; `None` for [`ScopeKind::Project`].
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Project => None,
            Self::Cluster
            | Self::Registry
            | Self::HelmRepo
            | Self::GitInstallation
            | Self::GitlabIntegration
            | Self::Infra
            | Self::Invite
            | Self::DeploymentTarget
            | Self::ApiContractRevision => Some(Self::Project),
            Self::Namespace => Some(Self::Cluster),
            Self::Operation => Some(Self::Infra),
            Self::Release | Self::Stack => Some(Self::Namespace),
        }
    }

    /// Returns the URL path parameter this kind reads its identifier from.
    #[must_use]
    pub const fn param_name(self) -> &'static str {
        match self {
            Self::Project => "project_id",
            Self::Cluster => "cluster_id",
            Self::Registry => "registry_id",
            Self::HelmRepo => "helm_repo_id",
            Self::GitInstallation => "git_installation_id",
            Self::GitlabIntegration => "integration_id",
            Self::Infra => "infra_id",
            Self::Operation => "operation_id",
            Self::Namespace => "namespace",
            Self::Release => "name",
            Self::Stack => "stack_id",
            Self::Invite => "invite_id",
            Self::DeploymentTarget => "deployment_target_id",
            Self::ApiContractRevision => "revision_id",
        }
    }

    /// Returns the identifier shape for this kind.
    #[must_use]
    pub const fn id_kind(self) -> IdKind {
        match self {
            Self::Operation | Self::Namespace | Self::Release | Self::Stack => IdKind::Name,
            Self::DeploymentTarget | Self::ApiContractRevision => IdKind::Uuid,
            _ => IdKind::Uint,
        }
    }

    /// Returns the snake_case name used in logs, metrics and policy JSON.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Cluster => "cluster",
            Self::Registry => "registry",
            Self::HelmRepo => "helm_repo",
            Self::GitInstallation => "git_installation",
            Self::GitlabIntegration => "gitlab_integration",
            Self::Infra => "infra",
            Self::Operation => "operation",
            Self::Namespace => "namespace",
            Self::Release => "release",
            Self::Stack => "stack",
            Self::Invite => "invite",
            Self::DeploymentTarget => "deployment_target",
            Self::ApiContractRevision => "api_contract_revision",
        }
    }

    /// Returns a human label for client-facing messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Cluster => "cluster",
            Self::Registry => "registry",
            Self::HelmRepo => "helm repo",
            Self::GitInstallation => "git installation",
            Self::GitlabIntegration => "gitlab integration",
            Self::Infra => "infra",
            Self::Operation => "operation",
            Self::Namespace => "namespace",
            Self::Release => "release",
            Self::Stack => "stack",
            Self::Invite => "invite",
            Self::DeploymentTarget => "deployment target",
            Self::ApiContractRevision => "api contract revision",
        }
    }

    /// Returns the distance from [`ScopeKind::Project`].
    #[must_use]
    pub fn depth(self) -> usize {
        self.ancestors().count()
    }

    /// Iterates over strict ancestors, nearest first.
    pub fn ancestors(self) -> impl Iterator<Item = Self> {
        std::iter::successors(self.parent(), |k| k.parent())
    }

    /// Iterates over the direct children of this kind.
    pub fn children(self) -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .filter(move |k| k.parent() == Some(self))
    }

    /// Returns the root-to-leaf path ending at this kind.
    #[must_use]
    pub fn path_from_root(self) -> Vec<Self> {
        let mut path: Vec<Self> = self.ancestors().collect();
        path.reverse();
        path.push(self);
        path
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of action a request performs.
///
/// Variants are declared in ascending privilege so that verb sets sort
/// read-like verbs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    /// Read a single resource.
    Read,
    /// List resources.
    List,
    /// Trigger a non-CRUD action.
    Action,
    /// Create a resource.
    Create,
    /// Update a resource.
    Update,
    /// Delete a resource.
    Delete,
}

impl Verb {
    /// Every verb.
    pub const ALL: [Self; 6] = [
        Self::Read,
        Self::List,
        Self::Action,
        Self::Create,
        Self::Update,
        Self::Delete,
    ];

    /// Verbs granted by read-only roles.
    pub const READ_ONLY: [Self; 2] = [Self::Read, Self::List];

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::List => "list",
            Self::Action => "action",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource identifier extracted from the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    /// Integer id.
    Uint(u64),
    /// UUID id.
    Uuid(Uuid),
    /// Identifier string.
    Name(String),
}

impl ResourceId {
    /// Returns the integer id, if this is one.
    #[must_use]
    pub const fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the string id, if this is one.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the UUID, if this is one.
    #[must_use]
    pub const fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the shape of this identifier.
    #[must_use]
    pub const fn kind(&self) -> IdKind {
        match self {
            Self::Uint(_) => IdKind::Uint,
            Self::Uuid(_) => IdKind::Uuid,
            Self::Name(_) => IdKind::Name,
        }
    }

    /// Compares by rendered form.
    ///
    /// Policy JSON may deserialize a UUID-shaped stack id as `Uuid` while the
    /// URL produced a `Name`; both denote the same resource.
    #[must_use]
    pub fn same_resource(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Uuid(a), Self::Uuid(b)) => a == b,
            (Self::Name(a), Self::Name(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(id) => write!(f, "{id}"),
            Self::Uuid(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<u64> for ResourceId {
    fn from(id: u64) -> Self {
        Self::Uint(id)
    }
}

impl From<Uuid> for ResourceId {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// The verb applied to one scope's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestAction {
    /// Requested verb.
    pub verb: Verb,
    /// Identifier extracted for this scope.
    pub id: ResourceId,
}

impl RequestAction {
    /// Creates a request action.
    #[must_use]
    pub fn new(verb: Verb, id: impl Into<ResourceId>) -> Self {
        Self {
            verb,
            id: id.into(),
        }
    }
}

/// Root-to-leaf map from scope kind to the requested action.
///
/// Built once by the scope resolver and never modified afterwards; the
/// type exposes no mutating methods.
///
/// # Example
///
/// ```
/// use warden_core::{RequestAction, ScopeChain, ScopeKind, Verb};
///
/// let chain: ScopeChain = [
///     (ScopeKind::Project, RequestAction::new(Verb::Create, 1u64)),
///     (ScopeKind::Cluster, RequestAction::new(Verb::Create, 4u64)),
/// ]
/// .into_iter()
/// .collect();
///
/// assert_eq!(chain.project_id(), Some(1));
/// assert_eq!(chain.kinds().collect::<Vec<_>>(), vec![ScopeKind::Project, ScopeKind::Cluster]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ScopeChain {
    entries: IndexMap<ScopeKind, RequestAction>,
}

impl ScopeChain {
    /// Returns the action recorded for `kind`.
    #[must_use]
    pub fn get(&self, kind: ScopeKind) -> Option<&RequestAction> {
        self.entries.get(&kind)
    }

    /// Returns the entry at `index` in root-to-leaf order.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<(ScopeKind, &RequestAction)> {
        self.entries.get_index(index).map(|(k, a)| (*k, a))
    }

    /// Iterates over entries in root-to-leaf order.
    pub fn iter(&self) -> impl Iterator<Item = (ScopeKind, &RequestAction)> {
        self.entries.iter().map(|(k, a)| (*k, a))
    }

    /// Iterates over the scope kinds in root-to-leaf order.
    pub fn kinds(&self) -> impl Iterator<Item = ScopeKind> + '_ {
        self.entries.keys().copied()
    }

    /// Returns the project id, when the chain includes the project scope.
    #[must_use]
    pub fn project_id(&self) -> Option<u64> {
        self.get(ScopeKind::Project).and_then(|a| a.id.as_uint())
    }

    /// Returns the deepest entry.
    #[must_use]
    pub fn leaf(&self) -> Option<(ScopeKind, &RequestAction)> {
        self.entries.last().map(|(k, a)| (*k, a))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(ScopeKind, RequestAction)> for ScopeChain {
    fn from_iter<I: IntoIterator<Item = (ScopeKind, RequestAction)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
