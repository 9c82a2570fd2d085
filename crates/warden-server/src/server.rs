//! HTTP server.
//!
//! Built on Hyper and Tokio. The server owns no routing logic: every
//! request is handed to the [`EndpointRegistry`] with the caller identity
//! in its extensions and a cancellation token tied to both the connection
//! and server shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden_authz::RepositoryPolicyLoader;
//! use warden_config::ServerConfig;
//! use warden_core::fixtures;
//! use warden_server::{EndpointRegistry, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = Arc::new(fixtures::seeded());
//!     let registry = EndpointRegistry::builder(repo.clone(), Arc::new(RepositoryPolicyLoader::new(repo)))
//!         .build()?;
//!
//!     Server::new(ServerConfig::default(), registry).run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_config::ServerConfig;
use warden_core::{ApiError, CancelReason};
use warden_middleware::Response;

use crate::error::ServerError;
use crate::identity::{IdentityExtractor, TrustedHeaderIdentity};
use crate::registry::EndpointRegistry;
use crate::shutdown::{shutdown_on_signal, ConnectionTracker};

/// The Warden HTTP server.
pub struct Server {
    config: ServerConfig,
    registry: Arc<EndpointRegistry>,
    identity: Arc<dyn IdentityExtractor>,
}

impl Server {
    /// Creates a server for `registry`.
    ///
    /// Callers are identified by [`TrustedHeaderIdentity`] unless replaced.
    #[must_use]
    pub fn new(config: ServerConfig, registry: EndpointRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            identity: Arc::new(TrustedHeaderIdentity),
        }
    }

    /// Replaces the identity extractor.
    #[must_use]
    pub fn with_identity_extractor(mut self, identity: Arc<dyn IdentityExtractor>) -> Self {
        self.identity = identity;
        self
    }

    /// Returns the server configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the endpoint registry.
    #[must_use]
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Runs until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = CancellationToken::new();
        tokio::spawn(shutdown_on_signal(shutdown.clone()));
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and serves until `shutdown` is cancelled.
    pub async fn run_with_shutdown(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let addr: SocketAddr = self.config.http_addr.parse().map_err(|e| {
            ServerError::Bind(format!("invalid address '{}': {e}", self.config.http_addr))
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("failed to bind to {addr}: {e}")))?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from `listener` until `shutdown` is cancelled.
    ///
    /// Cancelling `shutdown` stops accepting, cancels every in-flight
    /// request and waits up to the shutdown timeout for connections to
    /// close.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, endpoints = self.registry.len(), "server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new(server.config.max_connections as usize);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let Some(slot) = tracker.try_acquire() else {
                            warn!(
                                remote_addr = %remote_addr,
                                active = tracker.active_connections(),
                                "connection limit reached, dropping connection"
                            );
                            continue;
                        };
                        let server = Arc::clone(&server);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, shutdown).await {
                                debug!(remote_addr = %remote_addr, error = %e, "connection error");
                            }
                            drop(slot);
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },
            }
        }

        let timeout = server.config.shutdown_timeout();
        info!(
            active = tracker.active_connections(),
            timeout_secs = timeout.as_secs(),
            "waiting for connections to close"
        );
        if tokio::time::timeout(timeout, tracker.wait_idle()).await.is_err() {
            warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }

        info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        shutdown: CancellationToken,
    ) -> Result<(), hyper::Error> {
        let server = Arc::clone(self);
        let requests = shutdown.clone();
        let service = service_fn(move |request: hyper::Request<Incoming>| {
            let server = Arc::clone(&server);
            let cancel = requests.child_token();
            async move { Ok::<_, Infallible>(server.handle_request(request, cancel).await) }
        });

        let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.cancelled() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    async fn handle_request(
        &self,
        request: hyper::Request<Incoming>,
        cancel: CancellationToken,
    ) -> Response {
        // Hyper drops this future when the client disconnects.
        let _disconnect = cancel.clone().drop_guard();
        let deadline = self.registry.deadline_from(Instant::now());

        let (mut parts, body) = request.into_parts();
        let body = match self.read_body(body, &cancel, deadline).await {
            Ok(body) => body,
            Err(error) => return self.registry.reject(&parts, &error),
        };

        match self.identity.extract(&parts) {
            Ok(Some(identity)) => {
                parts.extensions.insert(identity);
            }
            Ok(None) => {}
            Err(error) => return self.registry.reject(&parts, &error),
        }

        self.registry
            .dispatch_until(
                http::Request::from_parts(parts, Full::new(body)),
                cancel,
                deadline,
            )
            .await
    }

    /// Collects the request body within the size limit and the deadline.
    async fn read_body(
        &self,
        body: Incoming,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Bytes, ApiError> {
        let limit = self.config.max_body_bytes;
        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ApiError::cancelled(CancelReason::ClientCancelled)),
            () = expired => Err(ApiError::cancelled(CancelReason::DeadlineExceeded)),
            collected = Limited::new(body, limit).collect() => match collected {
                Ok(collected) => Ok(collected.to_bytes()),
                Err(e) if e.is::<LengthLimitError>() => Err(ApiError::pass_through(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("request body exceeds {limit} bytes"),
                )),
                Err(e) => Err(ApiError::bad_request(format!("failed to read request body: {e}"))),
            },
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("identity", &self.identity)
            .finish()
    }
}
