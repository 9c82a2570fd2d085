//! Resource hydration.
//!
//! One [`HydrateStage`] runs per declared scope, in declaration order. Each
//! reads its parent's record from the context, loads its own record scoped by
//! the parent's ids, checks that the stored parent references agree, and
//! attaches the record under its kind.
//!
//! A missing record is reported as `ResourceNotInScope` (403), never 404, so
//! callers cannot probe for resources in projects they do not belong to.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, instrument};
use warden_core::{
    ApiError, ApiResult, Cluster, Infra, LoadedResource, Namespace, PipelineState, Project,
    Repository, RepositoryError, RepositoryResult, RequestContext, ResourceId, ScopeKind,
    ScopedResource,
};

use crate::middleware::{BoxFuture, Middleware, Next, PipelineError, PipelineResult};
use crate::types::Request;

/// Loads and attaches the record for one scope.
#[derive(Clone)]
pub struct HydrateStage {
    index: usize,
    kind: ScopeKind,
    repository: Arc<dyn Repository>,
}

impl HydrateStage {
    /// Creates the hydrator for the scope at `index` of the endpoint's scope list.
    #[must_use]
    pub fn new(index: usize, kind: ScopeKind, repository: Arc<dyn Repository>) -> Self {
        Self {
            index,
            kind,
            repository,
        }
    }

    /// Returns the scope kind this stage hydrates.
    #[must_use]
    pub const fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Loads this scope's record for `ctx`.
    ///
    /// # Errors
    ///
    /// - `ResourceNotInScope` when the record does not exist under its parent.
    /// - `Forbidden` when the stored record references a different parent.
    /// - `Internal` when the parent is not hydrated or the repository fails.
    /// - `Cancelled` when the request is cancelled or times out mid-read.
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), scope = %self.kind))]
    pub async fn hydrate(&self, ctx: &RequestContext) -> ApiResult<LoadedResource> {
        let action = ctx
            .chain()
            .and_then(|chain| chain.get(self.kind))
            .ok_or_else(|| ApiError::internal(format!("no {} in scope chain", self.kind)))?;
        let id = &action.id;
        let cancel = ctx.cancellation_token();
        let repo = self.repository.as_ref();

        let loaded = match self.kind {
            ScopeKind::Project => {
                let project = self
                    .read(ctx, id, None, repo.read_project(self.uint(id)?, cancel))
                    .await?;
                project.into_loaded()
            }
            ScopeKind::Cluster => {
                let project = parent::<Project>(ctx)?;
                let record = self
                    .read(
                        ctx,
                        id,
                        in_project(project),
                        repo.read_cluster(project.id, self.uint(id)?, cancel),
                    )
                    .await?;
                self.check_project(id, record.project_id, project)?;
                record.into_loaded()
            }
            ScopeKind::Registry => {
                let project = parent::<Project>(ctx)?;
                let record = self
                    .read(
                        ctx,
                        id,
                        in_project(project),
                        repo.read_registry(project.id, self.uint(id)?, cancel),
                    )
                    .await?;
                self.check_project(id, record.project_id, project)?;
                record.into_loaded()
            }
            ScopeKind::HelmRepo => {
                let project = parent::<Project>(ctx)?;
                let record = self
                    .read(
                        ctx,
                        id,
                        in_project(project),
                        repo.read_helm_repo(project.id, self.uint(id)?, cancel),
                    )
                    .await?;
                self.check_project(id, record.project_id, project)?;
                record.into_loaded()
            }
            ScopeKind::GitInstallation => {
                let project = parent::<Project>(ctx)?;
                let record = self
                    .read(
                        ctx,
                        id,
                        in_project(project),
                        repo.read_git_installation(project.id, self.uint(id)?, cancel),
                    )
                    .await?;
                self.check_project(id, record.project_id, project)?;
                record.into_loaded()
            }
            ScopeKind::GitlabIntegration => {
                let project = parent::<Project>(ctx)?;
                let record = self
                    .read(
                        ctx,
                        id,
                        in_project(project),
                        repo.read_gitlab_integration(project.id, self.uint(id)?, cancel),
                    )
                    .await?;
                self.check_project(id, record.project_id, project)?;
                record.into_loaded()
            }
            ScopeKind::Infra => {
                let project = parent::<Project>(ctx)?;
                let record = self
                    .read(
                        ctx,
                        id,
                        in_project(project),
                        repo.read_infra(project.id, self.uint(id)?, cancel),
                    )
                    .await?;
                self.check_project(id, record.project_id, project)?;
                record.into_loaded()
            }
            ScopeKind::Invite => {
                let project = parent::<Project>(ctx)?;
                let record = self
                    .read(
                        ctx,
                        id,
                        in_project(project),
                        repo.read_invite(project.id, self.uint(id)?, cancel),
                    )
                    .await?;
                self.check_project(id, record.project_id, project)?;
                record.into_loaded()
            }
            ScopeKind::DeploymentTarget => {
                let project = parent::<Project>(ctx)?;
                let record = self
                    .read(
                        ctx,
                        id,
                        in_project(project),
                        repo.read_deployment_target(project.id, self.uuid(id)?, cancel),
                    )
                    .await?;
                self.check_project(id, record.project_id, project)?;
                record.into_loaded()
            }
            ScopeKind::ApiContractRevision => {
                let project = parent::<Project>(ctx)?;
                let record = self
                    .read(
                        ctx,
                        id,
                        in_project(project),
                        repo.read_api_contract_revision(project.id, self.uuid(id)?, cancel),
                    )
                    .await?;
                self.check_project(id, record.project_id, project)?;
                record.into_loaded()
            }
            ScopeKind::Namespace => {
                let cluster = parent::<Cluster>(ctx)?;
                let within = Some((ScopeKind::Cluster, cluster.id.to_string()));
                let record = self
                    .read(ctx, id, within, repo.read_namespace(cluster.id, self.name_id(id)?, cancel))
                    .await?;
                if record.cluster_id != cluster.id {
                    return Err(self.mismatch(id, ScopeKind::Cluster, record.cluster_id, cluster.id));
                }
                record.into_loaded()
            }
            ScopeKind::Operation => {
                let infra = parent::<Infra>(ctx)?;
                let within = Some((ScopeKind::Infra, infra.id.to_string()));
                let record = self
                    .read(ctx, id, within, repo.read_operation(infra.id, self.name_id(id)?, cancel))
                    .await?;
                if record.infra_id != infra.id {
                    return Err(self.mismatch(id, ScopeKind::Infra, record.infra_id, infra.id));
                }
                record.into_loaded()
            }
            ScopeKind::Release => {
                let namespace = parent::<Namespace>(ctx)?;
                let within = Some((ScopeKind::Namespace, namespace.name.clone()));
                let record = self
                    .read(
                        ctx,
                        id,
                        within,
                        repo.read_release(namespace.cluster_id, &namespace.name, self.name_id(id)?, cancel),
                    )
                    .await?;
                self.check_namespace(id, record.cluster_id, &record.namespace, namespace)?;
                record.into_loaded()
            }
            ScopeKind::Stack => {
                let project = parent::<Project>(ctx)?;
                let namespace = parent::<Namespace>(ctx)?;
                let within = Some((ScopeKind::Namespace, namespace.name.clone()));
                let record = self
                    .read(ctx, id, within, repo.read_stack(project.id, self.name_id(id)?, cancel))
                    .await?;
                self.check_project(id, record.project_id, project)?;
                self.check_namespace(id, record.cluster_id, &record.namespace, namespace)?;
                record.into_loaded()
            }
        };

        debug!(id = %id, "resource hydrated");
        Ok(loaded)
    }

    async fn read<T, F>(
        &self,
        ctx: &RequestContext,
        id: &ResourceId,
        within: Option<(ScopeKind, String)>,
        read: F,
    ) -> ApiResult<Arc<T>>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        match ctx.run_cancellable(read).await? {
            Ok(record) => Ok(Arc::new(record)),
            Err(RepositoryError::RecordNotFound) => {
                let label = self.kind.label();
                Err(ApiError::not_in_scope(match within {
                    Some((parent, parent_id)) => format!(
                        "{label} with id {id} not found in {} {parent_id}",
                        parent.label()
                    ),
                    None => format!("{label} with id {id} not found"),
                }))
            }
            Err(error) => Err(ApiError::internal_with_source(
                format!("reading {} {id}", self.kind),
                error,
            )),
        }
    }

    fn check_project(&self, id: &ResourceId, stored: u64, project: &Project) -> ApiResult<()> {
        if stored == project.id {
            Ok(())
        } else {
            Err(self.mismatch(id, ScopeKind::Project, stored, project.id))
        }
    }

    fn check_namespace(
        &self,
        id: &ResourceId,
        cluster_id: u64,
        namespace: &str,
        parent: &Namespace,
    ) -> ApiResult<()> {
        if cluster_id != parent.cluster_id {
            return Err(self.mismatch(id, ScopeKind::Cluster, cluster_id, parent.cluster_id));
        }
        if namespace != parent.name {
            return Err(self.mismatch(id, ScopeKind::Namespace, namespace, &parent.name));
        }
        Ok(())
    }

    fn mismatch(
        &self,
        id: &ResourceId,
        parent: ScopeKind,
        stored: impl fmt::Display,
        requested: impl fmt::Display,
    ) -> ApiError {
        ApiError::forbidden(format!(
            "{} {id} belongs to {parent} {stored}, not {requested}",
            self.kind
        ))
    }

    fn uint(&self, id: &ResourceId) -> ApiResult<u64> {
        id.as_uint().ok_or_else(|| self.wrong_id(id))
    }

    fn uuid(&self, id: &ResourceId) -> ApiResult<uuid::Uuid> {
        id.as_uuid().ok_or_else(|| self.wrong_id(id))
    }

    fn name_id<'i>(&self, id: &'i ResourceId) -> ApiResult<&'i str> {
        id.as_name().ok_or_else(|| self.wrong_id(id))
    }

    fn wrong_id(&self, id: &ResourceId) -> ApiError {
        ApiError::internal(format!(
            "{} id {id} is a {}, expected {}",
            self.kind,
            id.kind(),
            self.kind.id_kind()
        ))
    }
}

fn parent<T: ScopedResource>(ctx: &RequestContext) -> ApiResult<&Arc<T>> {
    ctx.get::<T>()
        .ok_or_else(|| ApiError::internal(format!("{} not hydrated before its children", T::SCOPE)))
}

fn in_project(project: &Project) -> Option<(ScopeKind, String)> {
    Some((ScopeKind::Project, project.id.to_string()))
}

impl fmt::Debug for HydrateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydrateStage")
            .field("index", &self.index)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Middleware for HydrateStage {
    fn name(&self) -> &'static str {
        "hydrate"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let state = ctx.state();
            let hydrated = match self.hydrate(&ctx).await {
                Ok(loaded) => ctx
                    .attach_loaded(loaded)
                    .and_then(|ctx| ctx.advance(PipelineState::Hydrated(self.index))),
                Err(error) => Err(error),
            };

            match hydrated {
                Ok(ctx) => next.run(ctx, request).await,
                Err(error) => Err(PipelineError::new(self.name(), state, error)),
            }
        })
    }
}
