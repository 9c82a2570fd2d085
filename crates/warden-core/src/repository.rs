//! Repository interface.
//!
//! The pipeline never talks to storage directly. Each hydrator calls one
//! reader on [`Repository`], passing the identifiers of the resource's
//! parents so the query can be scoped. Every call also receives the
//! request's [`CancellationToken`]; implementations may watch it to abort
//! early, and the pipeline races every call against it regardless.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::policy::PolicyDocument;
use crate::resource::{
    ApiContractRevision, ApiToken, Cluster, DeploymentTarget, GitInstallation,
    GitlabIntegration, HelmRepo, Infra, Invite, Namespace, Operation, Project, Registry,
    Release, Stack,
};

/// Result type alias using [`RepositoryError`].
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors returned by repository readers.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No record matches the query.
    #[error("record not found")]
    RecordNotFound,

    /// The query failed.
    #[error("repository error: {0}")]
    Transient(#[from] anyhow::Error),
}

impl RepositoryError {
    /// Returns true for [`RepositoryError::RecordNotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound)
    }
}

/// Read access to resource records, policies and API tokens.
///
/// Implementations must be `Send + Sync`; a single instance is shared by
/// every request.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Reads a project.
    async fn read_project(
        &self,
        project_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Project>;

    /// Reads a cluster within a project.
    async fn read_cluster(
        &self,
        project_id: u64,
        cluster_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Cluster>;

    /// Reads a registry within a project.
    async fn read_registry(
        &self,
        project_id: u64,
        registry_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Registry>;

    /// Reads a Helm repo within a project.
    async fn read_helm_repo(
        &self,
        project_id: u64,
        helm_repo_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<HelmRepo>;

    /// Reads a GitHub installation within a project.
    async fn read_git_installation(
        &self,
        project_id: u64,
        git_installation_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<GitInstallation>;

    /// Reads a GitLab integration within a project.
    async fn read_gitlab_integration(
        &self,
        project_id: u64,
        integration_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<GitlabIntegration>;

    /// Reads an infra within a project.
    async fn read_infra(
        &self,
        project_id: u64,
        infra_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Infra>;

    /// Reads an operation on an infra.
    async fn read_operation(
        &self,
        infra_id: u64,
        operation_id: &str,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Operation>;

    /// Reads a namespace within a cluster.
    async fn read_namespace(
        &self,
        cluster_id: u64,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Namespace>;

    /// Reads a release within a cluster namespace.
    async fn read_release(
        &self,
        cluster_id: u64,
        namespace: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Release>;

    /// Reads a stack within a project.
    async fn read_stack(
        &self,
        project_id: u64,
        stack_id: &str,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Stack>;

    /// Reads an invite within a project.
    async fn read_invite(
        &self,
        project_id: u64,
        invite_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Invite>;

    /// Reads a deployment target within a project.
    async fn read_deployment_target(
        &self,
        project_id: u64,
        deployment_target_id: Uuid,
        cancel: &CancellationToken,
    ) -> RepositoryResult<DeploymentTarget>;

    /// Reads an API contract revision within a project.
    async fn read_api_contract_revision(
        &self,
        project_id: u64,
        revision_id: Uuid,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ApiContractRevision>;

    /// Lists every policy document attached to a user within a project.
    async fn list_user_policies(
        &self,
        project_id: u64,
        user_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<Vec<PolicyDocument>>;

    /// Reads an API token record.
    async fn read_api_token(
        &self,
        token_id: u64,
        cancel: &CancellationToken,
    ) -> RepositoryResult<ApiToken>;
}
