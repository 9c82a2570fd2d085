//! In-memory test client.

use std::sync::Arc;

use http::Method;
use tokio_util::sync::CancellationToken;
use warden_authz::RepositoryPolicyLoader;
use warden_core::fixtures::InMemoryRepository;
use warden_core::CallerIdentity;
use warden_server::{EndpointRegistry, EndpointRegistryBuilder};

use crate::error::TestError;
use crate::request::TestRequest;
use crate::response::TestResponse;

/// Starts a registry backed by `repository` and its policy loader.
pub fn registry_for(repository: &Arc<InMemoryRepository>) -> EndpointRegistryBuilder {
    EndpointRegistry::builder(
        repository.clone(),
        Arc::new(RepositoryPolicyLoader::new(repository.clone())),
    )
}

/// Sends requests straight to an [`EndpointRegistry`], without a socket.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use http::{Method, StatusCode};
/// use warden_core::{EndpointDescriptor, ScopeKind, Verb};
/// use warden_middleware::{empty_response, handler_fn};
/// use warden_test::{fixtures, registry_for, TestClient};
///
/// # tokio_test::block_on(async {
/// let repo = Arc::new(fixtures::seeded());
/// let registry = registry_for(&repo)
///     .route(
///         "/projects/{project_id}/clusters/{cluster_id}",
///         EndpointDescriptor::builder(Method::GET)
///             .verb(Verb::Read)
///             .scopes([ScopeKind::Project, ScopeKind::Cluster]),
///         handler_fn(|_ctx, _req| async { Ok(empty_response(StatusCode::OK)) }),
///     )
///     .build()
///     .unwrap();
///
/// let client = TestClient::new(registry).as_user(fixtures::VIEWER_USER);
/// let response = client.get("/projects/1/clusters/1").send().await;
/// response.assert_status(StatusCode::OK);
/// # });
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct TestClient {
    registry: Arc<EndpointRegistry>,
    identity: Option<CallerIdentity>,
}

impl TestClient {
    /// Creates an anonymous client.
    pub fn new(registry: EndpointRegistry) -> Self {
        Self::shared(Arc::new(registry))
    }

    /// Creates an anonymous client over a shared registry.
    pub fn shared(registry: Arc<EndpointRegistry>) -> Self {
        Self {
            registry,
            identity: None,
        }
    }

    /// Sends every request as user `user_id` unless overridden.
    pub fn as_user(self, user_id: u64) -> Self {
        self.as_identity(CallerIdentity::user(user_id))
    }

    /// Sends every request as `identity` unless overridden.
    pub fn as_identity(mut self, identity: CallerIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl Into<String>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl Into<String>) -> TestClientRequest<'_> {
        let mut request = TestRequest::new(method, uri);
        if let Some(identity) = self.identity {
            request = request.identity(identity);
        }
        TestClientRequest {
            client: self,
            request,
        }
    }

    async fn send_internal(
        &self,
        request: TestRequest,
        cancel: CancellationToken,
    ) -> Result<TestResponse, TestError> {
        let response = self.registry.dispatch(request.build()?, cancel).await;
        TestResponse::from_http(response).await
    }
}

/// A request bound to a [`TestClient`].
#[must_use]
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    request: TestRequest,
}

impl TestClientRequest<'_> {
    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.request = self.request.header(name, value);
        self
    }

    /// Sends as user `user_id`.
    pub fn as_user(mut self, user_id: u64) -> Self {
        self.request = self.request.as_user(user_id);
        self
    }

    /// Sends as API token `token_id` bound to `project_id`.
    pub fn as_token(mut self, token_id: u64, project_id: u64) -> Self {
        self.request = self.request.as_token(token_id, project_id);
        self
    }

    /// Sends without an identity.
    pub fn anonymous(mut self) -> Self {
        self.request = self.request.anonymous();
        self
    }

    /// Sets a JSON body.
    ///
    /// # Panics
    ///
    /// Panics if `value` cannot be serialized.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Self {
        self.request = self.request.json(value).expect("JSON serialization should succeed");
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built.
    pub async fn send(self) -> TestResponse {
        self.try_send().await.expect("request should succeed")
    }

    /// Sends the request under `cancel`.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built.
    pub async fn send_with_cancel(self, cancel: CancellationToken) -> TestResponse {
        self.client
            .send_internal(self.request, cancel)
            .await
            .expect("request should succeed")
    }

    /// Sends the request and returns a Result.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        self.client
            .send_internal(self.request, CancellationToken::new())
            .await
    }
}
