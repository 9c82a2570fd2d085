//! Resource records returned by the repository.
//!
//! There is one record type per [`ScopeKind`]. Hydrated records are stored
//! in the request context as [`LoadedResource`] values and shared read-only
//! through `Arc`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::policy::PolicyDocument;
use crate::scope::ScopeKind;

/// A tenant project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Project {
    /// Project id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Preview environments feature flag.
    pub preview_envs_enabled: bool,
    /// Stacks feature flag.
    pub stacks_enabled: bool,
}

/// A Kubernetes cluster connected to a project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster id.
    pub id: u64,
    /// Owning project.
    pub project_id: u64,
    /// Display name.
    pub name: String,
    /// Preview environments feature flag.
    pub preview_envs_enabled: bool,
}

/// A container registry integration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registry {
    /// Registry id.
    pub id: u64,
    /// Owning project.
    pub project_id: u64,
    /// Display name.
    pub name: String,
    /// Registry URL.
    pub url: String,
}

/// A Helm chart repository.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HelmRepo {
    /// Helm repo id.
    pub id: u64,
    /// Owning project.
    pub project_id: u64,
    /// Display name.
    pub name: String,
    /// Repository URL.
    pub repo_url: String,
}

/// A GitHub app installation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GitInstallation {
    /// Installation id.
    pub id: u64,
    /// Owning project.
    pub project_id: u64,
    /// GitHub account the app is installed on.
    pub account_name: String,
}

/// A GitLab instance integration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GitlabIntegration {
    /// Integration id.
    pub id: u64,
    /// Owning project.
    pub project_id: u64,
    /// GitLab instance URL.
    pub instance_url: String,
}

/// Provisioned infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Infra {
    /// Infra id.
    pub id: u64,
    /// Owning project.
    pub project_id: u64,
    /// Infra kind (e.g. `eks`).
    pub kind: String,
    /// Provisioning status.
    pub status: String,
}

/// A provisioning operation on an infra.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Operation {
    /// Operation id.
    pub id: String,
    /// Owning infra.
    pub infra_id: u64,
    /// Operation name (e.g. `apply`).
    pub name: String,
    /// Operation status.
    pub status: String,
}

/// A namespace inside a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace name.
    pub name: String,
    /// Owning cluster.
    pub cluster_id: u64,
}

/// A Helm release inside a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Release {
    /// Release name.
    pub name: String,
    /// Namespace the release lives in.
    pub namespace: String,
    /// Cluster the release lives in.
    pub cluster_id: u64,
    /// Current revision.
    pub revision: u32,
    /// Chart name.
    pub chart: String,
}

/// An application stack inside a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stack {
    /// Stack id.
    pub id: String,
    /// Owning project.
    pub project_id: u64,
    /// Cluster the stack deploys to.
    pub cluster_id: u64,
    /// Namespace the stack deploys to.
    pub namespace: String,
    /// Display name.
    pub name: String,
}

/// A pending project invitation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Invite {
    /// Invite id.
    pub id: u64,
    /// Owning project.
    pub project_id: u64,
    /// Invitee email.
    pub email: String,
}

/// A deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentTarget {
    /// Target id.
    pub id: Uuid,
    /// Owning project.
    pub project_id: u64,
    /// Cluster the target selects.
    pub cluster_id: u64,
    /// Namespace the target selects.
    pub namespace: String,
    /// Whether this is a preview target.
    pub is_preview: bool,
}

/// A revision of an API contract.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiContractRevision {
    /// Revision id.
    pub id: Uuid,
    /// Owning project.
    pub project_id: u64,
}

/// A stored API token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToken {
    /// Token id.
    pub id: u64,
    /// Project the token was issued for.
    pub project_id: u64,
    /// The single policy attached to the token.
    pub policy: PolicyDocument,
    /// Whether the token has been revoked.
    #[serde(default)]
    pub revoked: bool,
}

/// A hydrated resource, tagged by scope kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedResource {
    /// See [`Project`].
    Project(Arc<Project>),
    /// See [`Cluster`].
    Cluster(Arc<Cluster>),
    /// See [`Registry`].
    Registry(Arc<Registry>),
    /// See [`HelmRepo`].
    HelmRepo(Arc<HelmRepo>),
    /// See [`GitInstallation`].
    GitInstallation(Arc<GitInstallation>),
    /// See [`GitlabIntegration`].
    GitlabIntegration(Arc<GitlabIntegration>),
    /// See [`Infra`].
    Infra(Arc<Infra>),
    /// See [`Operation`].
    Operation(Arc<Operation>),
    /// See [`Namespace`].
    Namespace(Arc<Namespace>),
    /// See [`Release`].
    Release(Arc<Release>),
    /// See [`Stack`].
    Stack(Arc<Stack>),
    /// See [`Invite`].
    Invite(Arc<Invite>),
    /// See [`DeploymentTarget`].
    DeploymentTarget(Arc<DeploymentTarget>),
    /// See [`ApiContractRevision`].
    ApiContractRevision(Arc<ApiContractRevision>),
}

/// A record type bound to exactly one scope kind.
///
/// Lets the context hand out typed handles: `ctx.get::<Cluster>()`.
pub trait ScopedResource: Sized + Send + Sync + 'static {
    /// The scope kind this record belongs to.
    const SCOPE: ScopeKind;

    /// Borrows the record out of a loaded resource of the matching kind.
    fn from_loaded(loaded: &LoadedResource) -> Option<&Arc<Self>>;

    /// Wraps the record for storage in the context.
    fn into_loaded(self: Arc<Self>) -> LoadedResource;
}

macro_rules! scoped_resource {
    ($($ty:ident),* $(,)?) => {
        $(
            impl ScopedResource for $ty {
                const SCOPE: ScopeKind = ScopeKind::$ty;

                fn from_loaded(loaded: &LoadedResource) -> Option<&Arc<Self>> {
                    match loaded {
                        LoadedResource::$ty(r) => Some(r),
                        _ => None,
                    }
                }

                fn into_loaded(self: Arc<Self>) -> LoadedResource {
                    LoadedResource::$ty(self)
                }
            }
        )*

        impl LoadedResource {
            /// Returns the scope kind of the wrapped record.
            #[must_use]
            pub const fn kind(&self) -> ScopeKind {
                match self {
                    $(Self::$ty(_) => ScopeKind::$ty,)*
                }
            }
        }
    };
}

scoped_resource!(
    Project,
    Cluster,
    Registry,
    HelmRepo,
    GitInstallation,
    GitlabIntegration,
    Infra,
    Operation,
    Namespace,
    Release,
    Stack,
    Invite,
    DeploymentTarget,
    ApiContractRevision,
);
