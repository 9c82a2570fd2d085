//! Per-endpoint pipeline composition.
//!
//! Every endpoint gets the same fixed stage order, derived from its
//! descriptor when the registry is built:
//!
//! ```text
//! ScopeResolver -> Policy -> Hydrate(scope 0) .. Hydrate(scope n) -> [Gates] -> Handler
//! ```
//!
//! The gate stage is only present when the descriptor declares gates. A
//! pipeline is immutable once built and shared by every request to its
//! endpoint.

use std::fmt;
use std::sync::Arc;

use warden_authz::PolicyLoader;
use warden_core::{EndpointDescriptor, Repository, RequestContext};

use crate::middleware::{Handler, Middleware, Next, PipelineResult};
use crate::stages::{GateStage, HydrateStage, PolicyStage, ScopeResolverStage};
use crate::types::Request;

/// A type-erased stage that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The stage chain and handler for one endpoint.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use http::Method;
/// use warden_authz::RepositoryPolicyLoader;
/// use warden_core::{fixtures, EndpointDescriptor, ScopeKind, Verb};
/// use warden_middleware::{empty_response, handler_fn, Pipeline};
///
/// let repo = Arc::new(fixtures::seeded());
/// let descriptor = EndpointDescriptor::builder(Method::GET)
///     .verb(Verb::Read)
///     .scopes([ScopeKind::Project, ScopeKind::Cluster])
///     .build()
///     .unwrap();
/// let pipeline = Pipeline::for_endpoint(
///     &descriptor,
///     repo.clone(),
///     Arc::new(RepositoryPolicyLoader::new(repo)),
///     handler_fn(|_ctx, _req| async { Ok(empty_response(http::StatusCode::OK)) }),
/// );
///
/// assert_eq!(
///     pipeline.stage_names(),
///     vec!["scope_resolver", "policy", "hydrate", "hydrate"]
/// );
/// ```
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
    handler: Handler,
}

impl Pipeline {
    /// Composes the pipeline for `descriptor`.
    ///
    /// Stages run as scope resolver, policy, one hydrator per scope, then
    /// the feature gates. Gates read hydrated resources, so a missing
    /// resource answers with its not-in-scope message even when a gate
    /// would also have refused the request.
    #[must_use]
    pub fn for_endpoint(
        descriptor: &EndpointDescriptor,
        repository: Arc<dyn Repository>,
        loader: Arc<dyn PolicyLoader>,
        handler: Handler,
    ) -> Self {
        let scopes = descriptor.scopes();
        let mut stages: Vec<BoxedMiddleware> = Vec::with_capacity(scopes.len() + 3);

        stages.push(Arc::new(ScopeResolverStage::new(descriptor.verb(), scopes.to_vec())));
        stages.push(Arc::new(PolicyStage::new(loader)));
        for (index, &kind) in scopes.iter().enumerate() {
            stages.push(Arc::new(HydrateStage::new(index, kind, Arc::clone(&repository))));
        }
        if !descriptor.gates().is_empty() {
            stages.push(Arc::new(GateStage::new(descriptor.gates().to_vec())));
        }

        Self { stages, handler }
    }

    /// Runs the request through every stage and the handler.
    ///
    /// Stops at the first failing stage; the handler only runs when every
    /// stage succeeded.
    pub async fn process(&self, ctx: RequestContext, request: Request) -> PipelineResult {
        self.build_chain().run(ctx, request).await
    }

    fn build_chain(&self) -> Next<'_> {
        self.stages
            .iter()
            .rev()
            .fold(Next::handler(&self.handler), |next, stage| {
                Next::new(stage.as_ref(), next)
            })
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler_fn;
    use crate::types::empty_response;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;
    use warden_authz::RepositoryPolicyLoader;
    use warden_core::fixtures::{self, ADMIN_USER, VIEWER_USER};
    use warden_core::{
        CallerIdentity, Cluster, ErrorKind, FeatureGate, PipelineState, ScopeKind, Verb,
    };
    use warden_router::Params;

    fn descriptor(verb: Verb, gates: &[FeatureGate]) -> EndpointDescriptor {
        gates
            .iter()
            .fold(
                EndpointDescriptor::builder(Method::POST)
                    .verb(verb)
                    .scopes([ScopeKind::Project, ScopeKind::Cluster]),
                |builder, &gate| builder.gate(gate),
            )
            .build()
            .unwrap()
    }

    fn request() -> Request {
        http::Request::builder()
            .method(Method::POST)
            .uri("/projects/1/clusters/1")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn ctx(user: u64) -> RequestContext {
        let params: Params = [("project_id", "1"), ("cluster_id", "1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RequestContext::new(CancellationToken::new())
            .with_identity(CallerIdentity::user(user))
            .with_params(params)
    }

    fn counting(calls: &Arc<AtomicUsize>) -> Handler {
        let calls = Arc::clone(calls);
        handler_fn(move |ctx: RequestContext, _req| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                assert!(matches!(ctx.state(), PipelineState::Hydrated(1)));
                let cluster = ctx.get::<Cluster>().expect("cluster hydrated");
                assert_eq!(cluster.project_id, 1);
                Ok(empty_response(StatusCode::OK))
            }
        })
    }

    fn pipeline(verb: Verb, gates: &[FeatureGate], handler: Handler) -> Pipeline {
        let repo = Arc::new(fixtures::seeded());
        Pipeline::for_endpoint(
            &descriptor(verb, gates),
            repo.clone(),
            Arc::new(RepositoryPolicyLoader::new(repo)),
            handler,
        )
    }

    #[test]
    fn test_stage_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let plain = pipeline(Verb::Create, &[], counting(&calls));
        assert_eq!(
            plain.stage_names(),
            vec!["scope_resolver", "policy", "hydrate", "hydrate"]
        );

        let gated = pipeline(Verb::Create, &[FeatureGate::PreviewEnvironments], counting(&calls));
        assert_eq!(gated.stage_count(), 5);
        assert_eq!(gated.stage_names().last(), Some(&"feature_gate"));
    }

    #[tokio::test]
    async fn test_admin_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(Verb::Create, &[], counting(&calls));

        let response = pipeline.process(ctx(ADMIN_USER), request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_viewer_stops_at_policy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(Verb::Create, &[], counting(&calls));

        let err = pipeline
            .process(ctx(VIEWER_USER), request())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "policy");
        assert_eq!(err.state(), PipelineState::PolicyLoaded);
        assert_eq!(err.error().kind(), ErrorKind::Forbidden);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_gate_stops_before_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(Verb::Create, &[FeatureGate::PreviewEnvironments], counting(&calls));

        let err = pipeline.process(ctx(ADMIN_USER), request()).await.unwrap_err();
        assert_eq!(err.stage(), "feature_gate");
        assert_eq!(err.state(), PipelineState::Hydrated(1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
