//! Request context types.
//!
//! The [`RequestContext`] carries all per-request state through the pipeline
//! and into handlers. It is immutable: every attachment consumes the context
//! and returns a new one, and loaded resources are shared copy-on-write so a
//! context handed to one stage never observes changes made by a later one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use warden_router::Params;

use crate::error::{ApiError, CancelReason};
use crate::extract::UrlParams;
use crate::identity::CallerIdentity;
use crate::resource::{LoadedResource, Project, ScopedResource};
use crate::scope::{ScopeChain, ScopeKind};

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps log lines for one request sortable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a request is in the pipeline.
///
/// ```text
/// Start -> Resolved -> PolicyLoaded -> Authorized -> Hydrated(0) -> .. -> Hydrated(n)
///       -> Handled -> Done
/// ```
///
/// Any state except `Done` may move to `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing has run yet.
    Start,
    /// The scope chain is attached.
    Resolved,
    /// Policy documents are loaded.
    PolicyLoaded,
    /// The access evaluator granted the request.
    Authorized,
    /// The scope at this descriptor index is hydrated.
    Hydrated(usize),
    /// The handler returned.
    Handled,
    /// The response was written.
    Done,
    /// A stage failed.
    Errored,
}

impl PipelineState {
    /// Returns true if moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Done, _) => false,
            (_, Self::Errored)
            | (Self::Start, Self::Resolved)
            | (Self::Resolved, Self::PolicyLoaded)
            | (Self::PolicyLoaded, Self::Authorized)
            | (Self::Authorized, Self::Hydrated(0) | Self::Handled)
            | (Self::Hydrated(_), Self::Handled)
            | (Self::Handled, Self::Done) => true,
            (Self::Hydrated(i), Self::Hydrated(j)) => j == i + 1,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Resolved => f.write_str("resolved"),
            Self::PolicyLoaded => f.write_str("policy_loaded"),
            Self::Authorized => f.write_str("authorized"),
            Self::Hydrated(i) => write!(f, "hydrated({i})"),
            Self::Handled => f.write_str("handled"),
            Self::Done => f.write_str("done"),
            Self::Errored => f.write_str("errored"),
        }
    }
}

/// Per-request context that flows through the pipeline.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use warden_core::{CallerIdentity, Project, RequestContext};
///
/// let ctx = RequestContext::new(CancellationToken::new())
///     .with_identity(CallerIdentity::user(7));
///
/// let ctx = ctx
///     .attach(Arc::new(Project { id: 1, ..Project::default() }))
///     .unwrap();
///
/// assert_eq!(ctx.get::<Project>().map(|p| p.id), Some(1));
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    identity: Option<CallerIdentity>,
    endpoint: Option<Arc<str>>,
    params: Arc<Params>,
    chain: Option<Arc<ScopeChain>>,
    resources: Arc<BTreeMap<ScopeKind, LoadedResource>>,
    state: PipelineState,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    started_at: std::time::Instant,
}

impl RequestContext {
    /// Creates a context with a fresh request ID.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            request_id: RequestId::new(),
            identity: None,
            endpoint: None,
            params: Arc::new(Params::new()),
            chain: None,
            resources: Arc::new(BTreeMap::new()),
            state: PipelineState::Start,
            cancel,
            deadline: None,
            started_at: std::time::Instant::now(),
        }
    }

    /// Replaces the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Attaches the caller identity.
    #[must_use]
    pub fn with_identity(mut self, identity: CallerIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Records the matched endpoint label (`METHOD /template`).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<Arc<str>>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Attaches the captured URL parameters.
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Arc::new(params);
        self
    }

    /// Sets the instant after which the request is abandoned.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attaches the scope chain.
    ///
    /// Fails if a chain is already attached.
    pub fn with_chain(mut self, chain: ScopeChain) -> Result<Self, ApiError> {
        if self.chain.is_some() {
            return Err(ApiError::internal("scope chain attached twice"));
        }
        self.chain = Some(Arc::new(chain));
        Ok(self)
    }

    /// Moves to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(mut self, next: PipelineState) -> Result<Self, ApiError> {
        if !self.state.can_advance_to(next) {
            return Err(ApiError::internal(format!(
                "invalid pipeline transition {} -> {next}",
                self.state
            )));
        }
        self.state = next;
        Ok(self)
    }

    /// Attaches a hydrated resource under its scope kind.
    ///
    /// Fails if that kind is already attached; entries are never replaced.
    pub fn attach<T: ScopedResource>(self, resource: Arc<T>) -> Result<Self, ApiError> {
        self.attach_loaded(resource.into_loaded())
    }

    /// Attaches a loaded resource under its scope kind.
    pub fn attach_loaded(mut self, loaded: LoadedResource) -> Result<Self, ApiError> {
        let kind = loaded.kind();
        if self.resources.contains_key(&kind) {
            return Err(ApiError::internal(format!("{kind} attached twice")));
        }
        Arc::make_mut(&mut self.resources).insert(kind, loaded);
        Ok(self)
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the caller identity, if attached.
    #[must_use]
    pub const fn identity(&self) -> Option<&CallerIdentity> {
        self.identity.as_ref()
    }

    /// Returns the endpoint label, if routed.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Returns the raw captured URL parameters.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns a typed view of the URL parameters.
    #[must_use]
    pub fn url_params(&self) -> UrlParams<'_> {
        UrlParams::new(&self.params)
    }

    /// Returns the scope chain, once resolved.
    #[must_use]
    pub fn chain(&self) -> Option<&ScopeChain> {
        self.chain.as_deref()
    }

    /// Returns the pipeline state.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Returns the typed handle for `T`, if hydrated.
    ///
    /// Kinds the endpoint did not declare are never hydrated and return `None`.
    #[must_use]
    pub fn get<T: ScopedResource>(&self) -> Option<&Arc<T>> {
        self.resources.get(&T::SCOPE).and_then(T::from_loaded)
    }

    /// Returns the loaded resource for `kind`, if hydrated.
    #[must_use]
    pub fn resource(&self, kind: ScopeKind) -> Option<&LoadedResource> {
        self.resources.get(&kind)
    }

    /// Returns the hydrated project.
    #[must_use]
    pub fn project(&self) -> Option<&Arc<Project>> {
        self.get::<Project>()
    }

    /// Iterates over hydrated scope kinds in tree order.
    pub fn hydrated_kinds(&self) -> impl Iterator<Item = ScopeKind> + '_ {
        self.resources.keys().copied()
    }

    /// Returns the request's cancellation token.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the request deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Fails if the request is cancelled or past its deadline.
    pub fn check_cancelled(&self) -> Result<(), ApiError> {
        if self.cancel.is_cancelled() {
            return Err(ApiError::cancelled(CancelReason::ClientCancelled));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ApiError::cancelled(CancelReason::DeadlineExceeded));
        }
        Ok(())
    }

    /// Runs `fut` until it completes, the request is cancelled, or the
    /// deadline passes.
    ///
    /// Cancellation is checked first, so an already-cancelled request never
    /// polls `fut`.
    pub async fn run_cancellable<F, T>(&self, fut: F) -> Result<T, ApiError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                Err(ApiError::cancelled(CancelReason::ClientCancelled))
            }
            () = deadline_elapsed(self.deadline) => {
                Err(ApiError::cancelled(CancelReason::DeadlineExceeded))
            }
            out = fut => Ok(out),
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
