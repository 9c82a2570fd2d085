//! Test fixtures for Warden development and testing.
//!
//! Provides [`InMemoryRepository`], a [`Repository`] backed by hash maps with
//! failure injection, blocking reads and a read log, plus [`seeded`], a
//! repository pre-populated with a small project tree.
//!
//! # Example
//!
//! ```
//! use warden_core::fixtures::{self, ADMIN_USER, PROJECT_ID};
//! use warden_core::{Repository, ScopeKind};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let repo = fixtures::seeded();
//! let project = repo.read_project(PROJECT_ID, &CancellationToken::new()).await.unwrap();
//! assert_eq!(project.id, PROJECT_ID);
//! assert_eq!(repo.reads(), vec![fixtures::ReadTarget::Scope(ScopeKind::Project)]);
//! # });
//! ```

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::policy::PolicyDocument;
use crate::repository::{Repository, RepositoryError, RepositoryResult};
use crate::resource::{
    ApiContractRevision, ApiToken, Cluster, DeploymentTarget, GitInstallation,
    GitlabIntegration, HelmRepo, Infra, Invite, Namespace, Operation, Project, Registry,
    Release, Stack,
};
use crate::scope::ScopeKind;

/// Project seeded by [`seeded`].
pub const PROJECT_ID: u64 = 1;
/// Cluster seeded by [`seeded`].
pub const CLUSTER_ID: u64 = 1;
/// Namespace seeded by [`seeded`].
pub const NAMESPACE: &str = "default";
/// Release seeded by [`seeded`].
pub const RELEASE: &str = "app-1";
/// User holding the admin preset on [`PROJECT_ID`].
pub const ADMIN_USER: u64 = 7;
/// User holding the viewer preset on [`PROJECT_ID`].
pub const VIEWER_USER: u64 = 8;
/// User holding the developer preset on [`PROJECT_ID`].
pub const DEVELOPER_USER: u64 = 9;
/// API token bound to [`PROJECT_ID`] with the admin preset.
pub const ADMIN_TOKEN: u64 = 20;
/// Revoked API token bound to [`PROJECT_ID`].
pub const REVOKED_TOKEN: u64 = 21;
/// A second project with its own cluster, for cross-project tests.
pub const OTHER_PROJECT_ID: u64 = 2;
/// Cluster belonging to [`OTHER_PROJECT_ID`].
pub const OTHER_CLUSTER_ID: u64 = 2;

/// What a repository call read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadTarget {
    /// A resource reader.
    Scope(ScopeKind),
    /// `list_user_policies`.
    UserPolicies,
    /// `read_api_token`.
    ApiToken,
}

#[derive(Debug, Default)]
struct State {
    projects: HashMap<u64, Project>,
    clusters: HashMap<u64, Cluster>,
    registries: HashMap<u64, Registry>,
    helm_repos: HashMap<u64, HelmRepo>,
    git_installations: HashMap<u64, GitInstallation>,
    gitlab_integrations: HashMap<u64, GitlabIntegration>,
    infras: HashMap<u64, Infra>,
    operations: HashMap<String, Operation>,
    namespaces: HashMap<(u64, String), Namespace>,
    releases: HashMap<(u64, String, String), Release>,
    stacks: HashMap<String, Stack>,
    invites: HashMap<u64, Invite>,
    deployment_targets: HashMap<Uuid, DeploymentTarget>,
    revisions: HashMap<Uuid, ApiContractRevision>,
    user_policies: HashMap<(u64, u64), Vec<PolicyDocument>>,
    tokens: HashMap<u64, ApiToken>,
    failing: HashSet<ReadTarget>,
    blocked: HashSet<ReadTarget>,
    latency: Option<Duration>,
    unscoped: bool,
}

/// In-memory [`Repository`].
///
/// Readers are scoped by their parent ids by default, so a cluster of
/// another project is `RecordNotFound`. [`InMemoryRepository::unscoped`]
/// turns that off to exercise the pipeline's own cross-parent checks.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
    reads: Mutex<Vec<ReadTarget>>,
}

macro_rules! insert_fn {
    ($($name:ident => $field:ident : $ty:ty, $key:expr;)*) => {
        $(
            #[doc = concat!("Stores a [`", stringify!($ty), "`] record.")]
            pub fn $name(&self, record: $ty) -> &Self {
                let key = ($key)(&record);
                self.state.write().$field.insert(key, record);
                self
            }
        )*
    };
}

impl InMemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    insert_fn! {
        insert_project => projects: Project, |r: &Project| r.id;
        insert_cluster => clusters: Cluster, |r: &Cluster| r.id;
        insert_registry => registries: Registry, |r: &Registry| r.id;
        insert_helm_repo => helm_repos: HelmRepo, |r: &HelmRepo| r.id;
        insert_git_installation => git_installations: GitInstallation, |r: &GitInstallation| r.id;
        insert_gitlab_integration => gitlab_integrations: GitlabIntegration, |r: &GitlabIntegration| r.id;
        insert_infra => infras: Infra, |r: &Infra| r.id;
        insert_operation => operations: Operation, |r: &Operation| r.id.clone();
        insert_namespace => namespaces: Namespace, |r: &Namespace| (r.cluster_id, r.name.clone());
        insert_release => releases: Release, |r: &Release| (r.cluster_id, r.namespace.clone(), r.name.clone());
        insert_stack => stacks: Stack, |r: &Stack| r.id.clone();
        insert_invite => invites: Invite, |r: &Invite| r.id;
        insert_deployment_target => deployment_targets: DeploymentTarget, |r: &DeploymentTarget| r.id;
        insert_api_contract_revision => revisions: ApiContractRevision, |r: &ApiContractRevision| r.id;
        insert_api_token => tokens: ApiToken, |r: &ApiToken| r.id;
    }

    /// Attaches a policy document to a user within a project.
    pub fn grant(&self, project_id: u64, user_id: u64, policy: PolicyDocument) -> &Self {
        self.state
            .write()
            .user_policies
            .entry((project_id, user_id))
            .or_default()
            .push(policy);
        self
    }

    /// Makes every read of `target` fail with a transient error.
    pub fn fail(&self, target: ReadTarget) -> &Self {
        self.state.write().failing.insert(target);
        self
    }

    /// Makes every read of `target` wait until the request is cancelled.
    pub fn block(&self, target: ReadTarget) -> &Self {
        self.state.write().blocked.insert(target);
        self
    }

    /// Delays every read.
    pub fn set_latency(&self, latency: Duration) -> &Self {
        self.state.write().latency = Some(latency);
        self
    }

    /// Ignores parent ids when reading scoped records.
    pub fn unscoped(&self) -> &Self {
        self.state.write().unscoped = true;
        self
    }

    /// Returns every read performed so far, in order.
    #[must_use]
    pub fn reads(&self) -> Vec<ReadTarget> {
        self.reads.lock().clone()
    }

    /// Returns true if any read of `target` was performed.
    #[must_use]
    pub fn was_read(&self, target: ReadTarget) -> bool {
        self.reads.lock().contains(&target)
    }

    async fn read<T>(
        &self,
        target: ReadTarget,
        cancel: &CancellationToken,
        lookup: impl FnOnce(&State) -> Option<T> + Send,
    ) -> RepositoryResult<T> {
        self.reads.lock().push(target);

        let (blocked, latency) = {
            let state = self.state.read();
            (state.blocked.contains(&target), state.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if blocked {
            cancel.cancelled().await;
            return Err(anyhow::anyhow!("read of {target:?} abandoned").into());
        }

        let state = self.state.read();
        if state.failing.contains(&target) {
            return Err(anyhow::anyhow!("injected failure reading {target:?}").into());
        }
        lookup(&state).ok_or(RepositoryError::RecordNotFound)
    }
}

fn scoped<T: Clone>(record: Option<&T>, unscoped: bool, in_parent: impl Fn(&T) -> bool) -> Option<T> {
    record.filter(|r| unscoped || in_parent(r)).cloned()
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn read_project(
        &self,
        project_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Project> {
        self.read(ReadTarget::Scope(ScopeKind::Project), cancel, |s| {
            s.projects.get(&project_id).cloned()
        })
        .await
    }

    async fn read_cluster(
        &self,
        project_id: u64,
        cluster_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Cluster> {
        self.read(ReadTarget::Scope(ScopeKind::Cluster), cancel, |s| {
            scoped(s.clusters.get(&cluster_id), s.unscoped, |r| r.project_id == project_id)
        })
        .await
    }

    async fn read_registry(
        &self,
        project_id: u64,
        registry_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Registry> {
        self.read(ReadTarget::Scope(ScopeKind::Registry), cancel, |s| {
            scoped(s.registries.get(&registry_id), s.unscoped, |r| r.project_id == project_id)
        })
        .await
    }

    async fn read_helm_repo(
        &self,
        project_id: u64,
        helm_repo_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<HelmRepo> {
        self.read(ReadTarget::Scope(ScopeKind::HelmRepo), cancel, |s| {
            scoped(s.helm_repos.get(&helm_repo_id), s.unscoped, |r| r.project_id == project_id)
        })
        .await
    }

    async fn read_git_installation(
        &self,
        project_id: u64,
        git_installation_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<GitInstallation> {
        self.read(ReadTarget::Scope(ScopeKind::GitInstallation), cancel, |s| {
            scoped(
                s.git_installations.get(&git_installation_id),
                s.unscoped,
                |r| r.project_id == project_id,
            )
        })
        .await
    }

    async fn read_gitlab_integration(
        &self,
        project_id: u64,
        integration_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<GitlabIntegration> {
        self.read(ReadTarget::Scope(ScopeKind::GitlabIntegration), cancel, |s| {
            scoped(
                s.gitlab_integrations.get(&integration_id),
                s.unscoped,
                |r| r.project_id == project_id,
            )
        })
        .await
    }

    async fn read_infra(
        &self,
        project_id: u64,
        infra_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Infra> {
        self.read(ReadTarget::Scope(ScopeKind::Infra), cancel, |s| {
            scoped(s.infras.get(&infra_id), s.unscoped, |r| r.project_id == project_id)
        })
        .await
    }

    async fn read_operation(
        &self,
        infra_id: u64,
        operation_id: &str,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Operation> {
        self.read(ReadTarget::Scope(ScopeKind::Operation), cancel, |s| {
            scoped(s.operations.get(operation_id), s.unscoped, |r| r.infra_id == infra_id)
        })
        .await
    }

    async fn read_namespace(
        &self,
        cluster_id: u64,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Namespace> {
        self.read(ReadTarget::Scope(ScopeKind::Namespace), cancel, |s| {
            if s.unscoped {
                s.namespaces.values().find(|n| n.name == namespace).cloned()
            } else {
                s.namespaces.get(&(cluster_id, namespace.to_string())).cloned()
            }
        })
        .await
    }

    async fn read_release(
        &self,
        cluster_id: u64,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Release> {
        self.read(ReadTarget::Scope(ScopeKind::Release), cancel, |s| {
            if s.unscoped {
                s.releases.values().find(|r| r.name == name).cloned()
            } else {
                s.releases
                    .get(&(cluster_id, namespace.to_string(), name.to_string()))
                    .cloned()
            }
        })
        .await
    }

    async fn read_stack(
        &self,
        project_id: u64,
        stack_id: &str,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Stack> {
        self.read(ReadTarget::Scope(ScopeKind::Stack), cancel, |s| {
            scoped(s.stacks.get(stack_id), s.unscoped, |r| r.project_id == project_id)
        })
        .await
    }

    async fn read_invite(
        &self,
        project_id: u64,
        invite_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Invite> {
        self.read(ReadTarget::Scope(ScopeKind::Invite), cancel, |s| {
            scoped(s.invites.get(&invite_id), s.unscoped, |r| r.project_id == project_id)
        })
        .await
    }

    async fn read_deployment_target(
        &self,
        project_id: u64,
        deployment_target_id: Uuid,
        cancel: &CancellationToken,
    ) -> RepositoryResult<DeploymentTarget> {
        self.read(ReadTarget::Scope(ScopeKind::DeploymentTarget), cancel, |s| {
            scoped(
                s.deployment_targets.get(&deployment_target_id),
                s.unscoped,
                |r| r.project_id == project_id,
            )
        })
        .await
    }

    async fn read_api_contract_revision(
        &self,
        project_id: u64,
        revision_id: Uuid,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ApiContractRevision> {
        self.read(ReadTarget::Scope(ScopeKind::ApiContractRevision), cancel, |s| {
            scoped(s.revisions.get(&revision_id), s.unscoped, |r| r.project_id == project_id)
        })
        .await
    }

    async fn list_user_policies(
        &self,
        project_id: u64,
        user_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<PolicyDocument>> {
        self.read(ReadTarget::UserPolicies, cancel, |s| {
            s.user_policies.get(&(project_id, user_id)).cloned()
        })
        .await
    }

    async fn read_api_token(
        &self,
        token_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ApiToken> {
        self.read(ReadTarget::ApiToken, cancel, |s| s.tokens.get(&token_id).cloned())
            .await
    }
}

/// Returns a repository seeded with:
///
/// - project [`PROJECT_ID`] with preview environments and stacks disabled,
///   cluster [`CLUSTER_ID`], namespace [`NAMESPACE`], release [`RELEASE`],
///   registry 1, helm repo 1, git installation 1, gitlab integration 1,
///   infra 1 with operation `op-1`, invite 1, stack `stack-1`;
/// - project [`OTHER_PROJECT_ID`] with cluster [`OTHER_CLUSTER_ID`];
/// - admin, developer and viewer users and two API tokens on [`PROJECT_ID`].
#[must_use]
pub fn seeded() -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.insert_project(Project {
        id: PROJECT_ID,
        name: "acme".to_string(),
        ..Project::default()
    })
    .insert_project(Project {
        id: OTHER_PROJECT_ID,
        name: "globex".to_string(),
        ..Project::default()
    })
    .insert_cluster(Cluster {
        id: CLUSTER_ID,
        project_id: PROJECT_ID,
        name: "primary".to_string(),
        ..Cluster::default()
    })
    .insert_cluster(Cluster {
        id: OTHER_CLUSTER_ID,
        project_id: OTHER_PROJECT_ID,
        name: "globex-primary".to_string(),
        ..Cluster::default()
    })
    .insert_namespace(Namespace {
        name: NAMESPACE.to_string(),
        cluster_id: CLUSTER_ID,
    })
    .insert_release(Release {
        name: RELEASE.to_string(),
        namespace: NAMESPACE.to_string(),
        cluster_id: CLUSTER_ID,
        revision: 3,
        chart: "web".to_string(),
    })
    .insert_registry(Registry {
        id: 1,
        project_id: PROJECT_ID,
        name: "ecr".to_string(),
        url: "registry.example.com".to_string(),
    })
    .insert_helm_repo(HelmRepo {
        id: 1,
        project_id: PROJECT_ID,
        name: "bitnami".to_string(),
        repo_url: "https://charts.example.com".to_string(),
    })
    .insert_git_installation(GitInstallation {
        id: 1,
        project_id: PROJECT_ID,
        account_name: "acme".to_string(),
    })
    .insert_gitlab_integration(GitlabIntegration {
        id: 1,
        project_id: PROJECT_ID,
        instance_url: "https://gitlab.example.com".to_string(),
    })
    .insert_infra(Infra {
        id: 1,
        project_id: PROJECT_ID,
        kind: "eks".to_string(),
        status: "created".to_string(),
    })
    .insert_operation(Operation {
        id: "op-1".to_string(),
        infra_id: 1,
        name: "apply".to_string(),
        status: "completed".to_string(),
    })
    .insert_invite(Invite {
        id: 1,
        project_id: PROJECT_ID,
        email: "new@example.com".to_string(),
    })
    .insert_stack(Stack {
        id: "stack-1".to_string(),
        project_id: PROJECT_ID,
        cluster_id: CLUSTER_ID,
        namespace: NAMESPACE.to_string(),
        name: "web".to_string(),
    })
    .grant(PROJECT_ID, ADMIN_USER, PolicyDocument::admin(PROJECT_ID))
    .grant(PROJECT_ID, DEVELOPER_USER, PolicyDocument::developer(PROJECT_ID))
    .grant(PROJECT_ID, VIEWER_USER, PolicyDocument::viewer(PROJECT_ID))
    .insert_api_token(ApiToken {
        id: ADMIN_TOKEN,
        project_id: PROJECT_ID,
        policy: PolicyDocument::admin(PROJECT_ID),
        revoked: false,
    })
    .insert_api_token(ApiToken {
        id: REVOKED_TOKEN,
        project_id: PROJECT_ID,
        policy: PolicyDocument::admin(PROJECT_ID),
        revoked: true,
    });
    repo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scoped_reads() {
        let repo = seeded();
        let cancel = CancellationToken::new();

        assert!(repo.read_cluster(PROJECT_ID, CLUSTER_ID, &cancel).await.is_ok());
        assert!(repo
            .read_cluster(PROJECT_ID, OTHER_CLUSTER_ID, &cancel)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_unscoped_reads() {
        let repo = seeded();
        repo.unscoped();
        let cluster = repo
            .read_cluster(PROJECT_ID, OTHER_CLUSTER_ID, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(cluster.project_id, OTHER_PROJECT_ID);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let repo = seeded();
        repo.fail(ReadTarget::Scope(ScopeKind::Cluster));
        let err = repo
            .read_cluster(PROJECT_ID, CLUSTER_ID, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Transient(_)));
    }

    #[tokio::test]
    async fn test_blocked_read_waits_for_cancel() {
        let repo = seeded();
        repo.block(ReadTarget::UserPolicies);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = repo
            .list_user_policies(PROJECT_ID, ADMIN_USER, &cancel)
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(repo.reads(), vec![ReadTarget::UserPolicies]);
    }
}
