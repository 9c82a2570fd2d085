//! Policy stage: load the caller's documents and evaluate the scope chain.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use warden_authz::{AccessEvaluator, PolicyLoadOptions, PolicyLoader};
use warden_core::{
    ApiError, ApiResult, CallerIdentity, PipelineState, PolicyDocument, RequestContext, ScopeChain,
};
use warden_telemetry::metrics::record_authz_decision;

use crate::middleware::{BoxFuture, Middleware, Next, PipelineError, PipelineResult};
use crate::types::Request;

/// Authorizes the request against the caller's policy documents.
///
/// Loading moves the context to `PolicyLoaded`; a granting evaluation moves
/// it to `Authorized`. The loader call races the request's cancellation
/// token and deadline.
#[derive(Clone)]
pub struct PolicyStage {
    loader: Arc<dyn PolicyLoader>,
    evaluator: AccessEvaluator,
}

impl PolicyStage {
    /// Creates a stage over `loader`.
    #[must_use]
    pub fn new(loader: Arc<dyn PolicyLoader>) -> Self {
        Self {
            loader,
            evaluator: AccessEvaluator::new(),
        }
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    async fn load(&self, ctx: RequestContext) -> ApiResult<(RequestContext, Vec<PolicyDocument>)> {
        let identity = ctx
            .identity()
            .ok_or_else(|| ApiError::forbidden("no caller identity attached"))?;
        let project_id = ctx
            .chain()
            .and_then(ScopeChain::project_id)
            .ok_or_else(|| ApiError::internal("policy stage reached without a project scope"))?;

        let opts = PolicyLoadOptions {
            identity,
            project_id,
            cancel: ctx.cancellation_token(),
        };
        let documents = ctx
            .run_cancellable(self.loader.load_policy_documents(&opts))
            .await??;
        debug!(documents = documents.len(), "policy documents loaded");

        let ctx = ctx.advance(PipelineState::PolicyLoaded)?;
        Ok((ctx, documents))
    }

    fn authorize(
        &self,
        ctx: RequestContext,
        documents: &[PolicyDocument],
    ) -> ApiResult<RequestContext> {
        let chain = ctx
            .chain()
            .ok_or_else(|| ApiError::internal("policy stage reached without a scope chain"))?;
        let decision = self.evaluator.evaluate(documents, chain);
        record_authz_decision(decision.label());

        if !decision.allowed {
            let caller = ctx.identity().map(CallerIdentity::log_id).unwrap_or_default();
            let scope = decision
                .denied_at
                .map_or_else(|| "request".to_string(), |kind| kind.to_string());
            let verb = chain.leaf().map(|(_, action)| action.verb);
            info!(
                request_id = %ctx.request_id(),
                caller = %caller,
                denied_at = %scope,
                "access denied"
            );
            return Err(ApiError::forbidden(format!(
                "{caller} has no {} grant at {scope}",
                verb.map_or("", |v| v.as_str())
            )));
        }

        ctx.advance(PipelineState::Authorized)
    }
}

impl fmt::Debug for PolicyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyStage")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

impl Middleware for PolicyStage {
    fn name(&self) -> &'static str {
        "policy"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let state = ctx.state();
            let (ctx, documents) = match self.load(ctx).await {
                Ok(loaded) => loaded,
                Err(error) => return Err(PipelineError::new(self.name(), state, error)),
            };

            let state = ctx.state();
            match self.authorize(ctx, &documents) {
                Ok(ctx) => next.run(ctx, request).await,
                Err(error) => Err(PipelineError::new(self.name(), state, error)),
            }
        })
    }
}
