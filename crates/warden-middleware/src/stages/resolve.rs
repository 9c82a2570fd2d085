//! Scope resolution stage.
//!
//! Turns the matched URL parameters into the request's [`ScopeChain`]: one
//! `{verb, id}` entry per declared scope, in declaration order. No I/O.

use std::sync::Arc;

use tracing::debug;
use warden_core::{
    ApiError, ApiResult, PipelineState, RequestAction, RequestContext, ScopeChain, ScopeKind, Verb,
};

use crate::middleware::{BoxFuture, Middleware, Next, PipelineError, PipelineResult};
use crate::types::Request;

/// Builds the scope chain from URL parameters.
#[derive(Debug, Clone)]
pub struct ScopeResolverStage {
    verb: Verb,
    scopes: Arc<[ScopeKind]>,
}

impl ScopeResolverStage {
    /// Creates a resolver for an endpoint performing `verb` over `scopes`.
    #[must_use]
    pub fn new(verb: Verb, scopes: impl Into<Arc<[ScopeKind]>>) -> Self {
        Self {
            verb,
            scopes: scopes.into(),
        }
    }

    /// Builds the chain for the context's parameters.
    ///
    /// # Errors
    ///
    /// - `MalformedParameter` when a value does not parse as its scope's id type.
    /// - `Internal` when the route never captured a declared scope's parameter.
    pub fn resolve(&self, ctx: &RequestContext) -> ApiResult<ScopeChain> {
        let params = ctx.url_params();
        self.scopes
            .iter()
            .map(|&kind| {
                let name = kind.param_name();
                if !params.contains(name) {
                    return Err(ApiError::internal(format!(
                        "route does not capture {name} for scope {kind}"
                    )));
                }
                let id = params.get(kind)?;
                Ok((kind, RequestAction::new(self.verb, id)))
            })
            .collect()
    }
}

impl Middleware for ScopeResolverStage {
    fn name(&self) -> &'static str {
        "scope_resolver"
    }

    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let state = ctx.state();
            let resolved = self
                .resolve(&ctx)
                .and_then(|chain| ctx.with_chain(chain))
                .and_then(|ctx| ctx.advance(PipelineState::Resolved));

            match resolved {
                Ok(ctx) => {
                    debug!(
                        request_id = %ctx.request_id(),
                        scopes = ctx.chain().map_or(0, ScopeChain::len),
                        verb = %self.verb,
                        "scope chain resolved"
                    );
                    next.run(ctx, request).await
                }
                Err(error) => Err(PipelineError::new(self.name(), state, error)),
            }
        })
    }
}
