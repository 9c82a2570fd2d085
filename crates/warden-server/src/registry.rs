//! Endpoint registry and request dispatch.
//!
//! Endpoints are declared once at startup. [`EndpointRegistryBuilder::build`]
//! validates every descriptor against its template, detects routing
//! conflicts, and composes each endpoint's pipeline. The resulting
//! [`EndpointRegistry`] is immutable and shared by every connection.

use std::sync::Arc;
use std::time::Duration;

use http::header::HeaderValue;
use http::{Method, StatusCode};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;
use warden_authz::PolicyLoader;
use warden_core::{
    ApiError, CallerIdentity, EndpointDescriptorBuilder, Repository, RequestContext, RequestId,
};
use warden_config::PipelineConfig;
use warden_middleware::{
    ErrorReporter, Handler, Pipeline, Request, RequestMeta, Response, TracingAlerter,
};
use warden_router::{Lookup, Router};
use warden_telemetry::metrics::record_request;
use warden_telemetry::InFlightGuard;

use crate::error::RegistrationError;

/// Header used to propagate the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Metric label for requests that matched no endpoint.
const UNMATCHED_ENDPOINT: &str = "unmatched";

struct Endpoint {
    label: Arc<str>,
    pipeline: Pipeline,
}

struct PendingRoute {
    template: String,
    descriptor: EndpointDescriptorBuilder,
    handler: Handler,
}

/// Collects endpoint declarations.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use http::Method;
/// use warden_authz::RepositoryPolicyLoader;
/// use warden_core::{fixtures, EndpointDescriptor, ScopeKind, Verb};
/// use warden_middleware::{empty_response, handler_fn};
/// use warden_server::EndpointRegistry;
///
/// let repo = Arc::new(fixtures::seeded());
/// let registry = EndpointRegistry::builder(repo.clone(), Arc::new(RepositoryPolicyLoader::new(repo)))
///     .route(
///         "/projects/{project_id}/clusters/{cluster_id}",
///         EndpointDescriptor::builder(Method::POST)
///             .verb(Verb::Create)
///             .scopes([ScopeKind::Project, ScopeKind::Cluster]),
///         handler_fn(|_ctx, _req| async { Ok(empty_response(http::StatusCode::OK)) }),
///     )
///     .build()
///     .unwrap();
///
/// assert_eq!(registry.len(), 1);
/// ```
pub struct EndpointRegistryBuilder {
    repository: Arc<dyn Repository>,
    loader: Arc<dyn PolicyLoader>,
    reporter: ErrorReporter,
    request_timeout: Option<Duration>,
    routes: Vec<PendingRoute>,
}

impl EndpointRegistryBuilder {
    /// Declares an endpoint at `template`.
    ///
    /// Validation is deferred to [`build`](Self::build).
    #[must_use]
    pub fn route(
        mut self,
        template: impl Into<String>,
        descriptor: EndpointDescriptorBuilder,
        handler: Handler,
    ) -> Self {
        self.routes.push(PendingRoute {
            template: template.into(),
            descriptor,
            handler,
        });
        self
    }

    /// Sets the error reporter.
    #[must_use]
    pub fn reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Configures error reporting from the pipeline section.
    ///
    /// Alerts go to [`TracingAlerter`] when enabled.
    #[must_use]
    pub fn pipeline_config(mut self, config: &PipelineConfig) -> Self {
        let mut reporter = ErrorReporter::new().with_internal_logging(config.log_internal_errors);
        if config.alerts_enabled {
            reporter = reporter.with_alerter(Arc::new(TracingAlerter));
        }
        self.reporter = reporter;
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Validates every endpoint and freezes the registry.
    pub fn build(self) -> Result<EndpointRegistry, RegistrationError> {
        let mut router = Router::new();

        for route in self.routes {
            let method = route.descriptor.method().clone();
            let descriptor = route
                .descriptor
                .build()
                .and_then(|d| d.validate_template(&route.template).map(|()| d))
                .map_err(|source| RegistrationError::Descriptor {
                    method: method.clone(),
                    template: route.template.clone(),
                    source,
                })?;

            let endpoint = Endpoint {
                label: format!("{method} {}", route.template).into(),
                pipeline: Pipeline::for_endpoint(
                    &descriptor,
                    Arc::clone(&self.repository),
                    Arc::clone(&self.loader),
                    route.handler,
                ),
            };
            router
                .route(method.clone(), &route.template, endpoint)
                .map_err(|source| RegistrationError::Route {
                    method,
                    template: route.template,
                    source,
                })?;
        }

        Ok(EndpointRegistry {
            router,
            reporter: self.reporter,
            request_timeout: self.request_timeout,
        })
    }
}

/// The frozen set of endpoints.
pub struct EndpointRegistry {
    router: Router<Endpoint>,
    reporter: ErrorReporter,
    request_timeout: Option<Duration>,
}

impl EndpointRegistry {
    /// Starts a registry whose endpoints share `repository` and `loader`.
    #[must_use]
    pub fn builder(
        repository: Arc<dyn Repository>,
        loader: Arc<dyn PolicyLoader>,
    ) -> EndpointRegistryBuilder {
        EndpointRegistryBuilder {
            repository,
            loader,
            reporter: ErrorReporter::new(),
            request_timeout: None,
            routes: Vec::new(),
        }
    }

    /// Returns the number of registered endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.router.len()
    }

    /// Returns true if no endpoint is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.router.is_empty()
    }

    /// Returns the stage names of the endpoint at `(method, path)`.
    #[must_use]
    pub fn stage_names(&self, method: &Method, path: &str) -> Option<Vec<&'static str>> {
        self.router
            .match_route(method, path)
            .map(|m| m.value.pipeline.stage_names())
    }

    /// Routes `request` through its endpoint's pipeline.
    ///
    /// The caller identity is read from the request extensions. Every error,
    /// including unknown paths and methods, is turned into a response by the
    /// registry's [`ErrorReporter`]; this never fails.
    pub async fn dispatch(&self, request: Request, cancel: CancellationToken) -> Response {
        let deadline = self.deadline_from(Instant::now());
        self.dispatch_until(request, cancel, deadline).await
    }

    /// The request deadline for a request that arrived at `arrival`.
    pub(crate) fn deadline_from(&self, arrival: Instant) -> Option<Instant> {
        self.request_timeout.map(|timeout| arrival + timeout)
    }

    /// Like [`dispatch`](Self::dispatch), with a deadline fixed by the caller.
    pub(crate) async fn dispatch_until(
        &self,
        request: Request,
        cancel: CancellationToken,
        deadline: Option<Instant>,
    ) -> Response {
        let started = std::time::Instant::now();
        let _in_flight = InFlightGuard::new();

        let request_id = header_request_id(request.headers());
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let identity = request.extensions().get::<CallerIdentity>().copied();
        let meta = RequestMeta::new(request_id, method.clone(), path.clone())
            .with_caller(identity.as_ref().map(CallerIdentity::log_id));

        let span = info_span!("request", request_id = %request_id, method = %method, path = %path);
        let (label, mut response) = async {
            match self.router.lookup(&method, &path) {
                Lookup::Found(route) => {
                    let endpoint = route.value;
                    let mut ctx = RequestContext::new(cancel)
                        .with_request_id(request_id)
                        .with_endpoint(Arc::clone(&endpoint.label))
                        .with_params(route.params);
                    if let Some(identity) = identity {
                        ctx = ctx.with_identity(identity);
                    }
                    if let Some(deadline) = deadline {
                        ctx = ctx.with_deadline(deadline);
                    }

                    let response = match endpoint.pipeline.process(ctx, request).await {
                        Ok(response) => response,
                        Err(failure) => self.reporter.report(
                            &meta
                                .with_endpoint(endpoint.label.as_ref())
                                .with_failure(failure.stage(), failure.state()),
                            failure.error(),
                        ),
                    };
                    (endpoint.label.as_ref(), response)
                }
                Lookup::MethodNotAllowed(allowed) => {
                    debug!(allowed = ?allowed, "method not allowed");
                    let error = ApiError::pass_through(
                        StatusCode::METHOD_NOT_ALLOWED,
                        format!("method {method} not allowed for {path}"),
                    );
                    (UNMATCHED_ENDPOINT, self.reporter.report(&meta, &error))
                }
                Lookup::NotFound => {
                    let error = ApiError::pass_through(
                        StatusCode::NOT_FOUND,
                        format!("no endpoint matches {path}"),
                    );
                    (UNMATCHED_ENDPOINT, self.reporter.report(&meta, &error))
                }
            }
        }
        .instrument(span)
        .await;

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        record_request(label, response.status().as_u16(), started.elapsed());
        response
    }

    /// Answers a request rejected before dispatch.
    pub(crate) fn reject(&self, parts: &http::request::Parts, error: &ApiError) -> Response {
        let started = std::time::Instant::now();
        let request_id = header_request_id(&parts.headers);
        let meta = RequestMeta::new(request_id, parts.method.clone(), parts.uri.path());
        let mut response = self.reporter.report(&meta, error);
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        record_request(UNMATCHED_ENDPOINT, response.status().as_u16(), started.elapsed());
        response
    }
}

fn header_request_id(headers: &http::HeaderMap) -> RequestId {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .map_or_else(RequestId::new, RequestId::from_uuid)
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &self.router.len())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
