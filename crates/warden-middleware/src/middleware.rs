//! Core middleware trait and chain types.
//!
//! A stage receives the request context by value, derives a new context from
//! it, and hands that to [`Next::run`]. Stages never mutate a context another
//! stage can observe. A stage that fails returns a [`PipelineError`] instead
//! of calling `next`, which short-circuits the rest of the chain including
//! the handler.
//!
//! ```ignore
//! impl Middleware for AuditStage {
//!     fn name(&self) -> &'static str {
//!         "audit"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: RequestContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, PipelineResult> {
//!         Box::pin(async move {
//!             tracing::info!(request_id = %ctx.request_id(), "audited");
//!             next.run(ctx, request).await
//!         })
//!     }
//! }
//! ```

use crate::types::{Request, Response};
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use warden_core::{ApiError, ApiResult, PipelineState, RequestContext};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of running the remaining chain.
pub type PipelineResult = Result<Response, PipelineError>;

/// An endpoint handler.
///
/// Handlers receive the fully hydrated context and may only read the
/// resources their endpoint declared.
pub type Handler =
    Arc<dyn Fn(RequestContext, Request) -> BoxFuture<'static, ApiResult<Response>> + Send + Sync>;

/// Wraps an async function as a [`Handler`].
///
/// ```
/// use warden_core::{Cluster, RequestContext};
/// use warden_middleware::{empty_response, handler_fn, Request};
///
/// let handler = handler_fn(|ctx: RequestContext, _req: Request| async move {
///     let _cluster = ctx.get::<Cluster>();
///     Ok(empty_response(http::StatusCode::OK))
/// });
/// # drop(handler);
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<Response>> + Send + 'static,
{
    Arc::new(move |ctx, request| Box::pin(f(ctx, request)))
}

/// A stage failure, tagged with where it happened.
#[derive(Debug, Error)]
#[error("{stage} failed in state {state}: {error}")]
pub struct PipelineError {
    stage: &'static str,
    state: PipelineState,
    #[source]
    error: ApiError,
}

impl PipelineError {
    /// Creates a failure of `stage` while the context was in `state`.
    #[must_use]
    pub const fn new(stage: &'static str, state: PipelineState, error: ApiError) -> Self {
        Self {
            stage,
            state,
            error,
        }
    }

    /// Name of the failing stage.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        self.stage
    }

    /// Pipeline state at the time of the failure.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// The error to report.
    #[must_use]
    pub const fn error(&self) -> &ApiError {
        &self.error
    }

    /// Consumes the failure, returning the error.
    #[must_use]
    pub fn into_error(self) -> ApiError {
        self.error
    }
}

/// The core middleware trait.
///
/// A stage must either call `next.run()` exactly once or return an error.
pub trait Middleware: Send + Sync + 'static {
    /// Stage name used in logs and failures.
    fn name(&self) -> &'static str;

    /// Processes the request and continues the chain.
    fn process<'a>(
        &'a self,
        ctx: RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult>;
}

/// The remainder of the chain.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(&'a Handler),
}

impl<'a> Next<'a> {
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    pub(crate) const fn handler(handler: &'a Handler) -> Self {
        Self {
            inner: NextInner::Handler(handler),
        }
    }

    /// Runs the next stage, or the handler at the end of the chain.
    ///
    /// The handler only runs once the context has been authorized; a panic
    /// inside it becomes an internal error.
    pub async fn run(self, ctx: RequestContext, request: Request) -> PipelineResult {
        match self.inner {
            NextInner::Chain { middleware, next } => {
                middleware.process(ctx, request, *next).await
            }
            NextInner::Handler(handler) => {
                let state = ctx.state();
                if !state.can_advance_to(PipelineState::Handled) {
                    return Err(PipelineError::new(
                        "handler",
                        state,
                        ApiError::internal(format!("handler reached in state {state}")),
                    ));
                }

                match AssertUnwindSafe(async move { handler(ctx, request).await })
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(error)) => Err(PipelineError::new("handler", state, error)),
                    Err(_) => Err(PipelineError::new(
                        "handler",
                        state,
                        ApiError::internal("handler panicked"),
                    )),
                }
            }
        }
    }
}
