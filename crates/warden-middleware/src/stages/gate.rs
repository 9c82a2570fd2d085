//! Feature gates checked after hydration.

use std::sync::Arc;

use tracing::info;
use warden_core::{ApiError, ApiResult, Cluster, FeatureGate, Project, RequestContext};

use crate::middleware::{BoxFuture, Middleware, Next, PipelineError, PipelineResult};
use crate::types::Request;

/// Denies the request when a hydrated resource has a required feature off.
///
/// Gates run in declaration order and stop at the first failure. Messages
/// are sent to the client.
#[derive(Debug, Clone)]
pub struct GateStage {
    gates: Arc<[FeatureGate]>,
}

impl GateStage {
    /// Creates a stage checking `gates`.
    #[must_use]
    pub fn new(gates: impl Into<Arc<[FeatureGate]>>) -> Self {
        Self {
            gates: gates.into(),
        }
    }

    /// Checks every gate against the hydrated resources.
    pub fn check(&self, ctx: &RequestContext) -> ApiResult<()> {
        self.gates.iter().try_for_each(|&gate| check_gate(gate, ctx))
    }
}

fn check_gate(gate: FeatureGate, ctx: &RequestContext) -> ApiResult<()> {
    let project = ctx
        .get::<Project>()
        .ok_or_else(|| ApiError::internal(format!("gate {gate} needs a hydrated project")))?;

    match gate {
        FeatureGate::PreviewEnvironments => {
            if !project.preview_envs_enabled {
                return Err(ApiError::forbidden_public(
                    "preview environments are not enabled for this project",
                ));
            }
            let cluster = ctx
                .get::<Cluster>()
                .ok_or_else(|| ApiError::internal(format!("gate {gate} needs a hydrated cluster")))?;
            if !cluster.preview_envs_enabled {
                return Err(ApiError::forbidden_public(
                    "preview environments are not enabled for this cluster",
                ));
            }
        }
        FeatureGate::Stacks => {
            if !project.stacks_enabled {
                return Err(ApiError::forbidden_public("stacks are not enabled for this project"));
            }
        }
    }
    Ok(())
}

impl Middleware for GateStage {
    fn name(&self) -> &'static str {
        "feature_gate"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            if let Err(error) = self.check(&ctx) {
                info!(request_id = %ctx.request_id(), reason = %error, "feature gate closed");
                return Err(PipelineError::new(self.name(), ctx.state(), error));
            }
            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use warden_core::ErrorKind;

    fn ctx(project: Project, cluster: Option<Cluster>) -> RequestContext {
        let ctx = RequestContext::new(CancellationToken::new())
            .attach(Arc::new(project))
            .unwrap();
        match cluster {
            Some(cluster) => ctx.attach(Arc::new(cluster)).unwrap(),
            None => ctx,
        }
    }

    fn project(preview: bool, stacks: bool) -> Project {
        Project {
            id: 1,
            preview_envs_enabled: preview,
            stacks_enabled: stacks,
            ..Project::default()
        }
    }

    fn cluster(preview: bool) -> Cluster {
        Cluster {
            id: 1,
            project_id: 1,
            preview_envs_enabled: preview,
            ..Cluster::default()
        }
    }

    #[test]
    fn test_project_flag_checked_first() {
        let stage = GateStage::new(vec![FeatureGate::PreviewEnvironments]);
        let err = stage.check(&ctx(project(false, false), Some(cluster(false)))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(
            err.external_message().as_deref(),
            Some("preview environments are not enabled for this project")
        );
    }

    #[test]
    fn test_project_flag_off_skips_cluster() {
        let stage = GateStage::new(vec![FeatureGate::PreviewEnvironments]);
        // No cluster hydrated: reaching the cluster check would be Internal.
        let err = stage.check(&ctx(project(false, false), None)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_cluster_flag() {
        let stage = GateStage::new(vec![FeatureGate::PreviewEnvironments]);
        let err = stage.check(&ctx(project(true, false), Some(cluster(false)))).unwrap_err();
        assert_eq!(
            err.external_message().as_deref(),
            Some("preview environments are not enabled for this cluster")
        );
        assert!(stage.check(&ctx(project(true, false), Some(cluster(true)))).is_ok());
    }

    #[test]
    fn test_stacks_gate() {
        let stage = GateStage::new(vec![FeatureGate::Stacks]);
        let err = stage.check(&ctx(project(true, false), None)).unwrap_err();
        assert_eq!(
            err.external_message().as_deref(),
            Some("stacks are not enabled for this project")
        );
        assert!(stage.check(&ctx(project(false, true), None)).is_ok());
    }
}
