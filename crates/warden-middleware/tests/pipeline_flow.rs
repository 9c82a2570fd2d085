//! Pipeline and reporter working together, end to end without a server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use tokio_util::sync::CancellationToken;
use warden_authz::RepositoryPolicyLoader;
use warden_core::fixtures::{self, InMemoryRepository, ReadTarget, ADMIN_USER, DEVELOPER_USER};
use warden_core::{
    CallerIdentity, EndpointDescriptor, PipelineState, Release, RequestContext, ScopeKind, Verb,
};
use warden_middleware::{
    empty_response, handler_fn, ErrorReporter, Handler, Pipeline, Request, RequestMeta, Response,
};
use warden_router::Params;

const RELEASE_PATH: &str = "/projects/1/clusters/1/apps/default/app-1";

fn release_descriptor(verb: Verb) -> EndpointDescriptor {
    EndpointDescriptor::builder(Method::GET)
        .verb(verb)
        .scopes([
            ScopeKind::Project,
            ScopeKind::Cluster,
            ScopeKind::Namespace,
            ScopeKind::Release,
        ])
        .build()
        .unwrap()
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn release_ctx(user: u64, release: &str, cancel: CancellationToken) -> RequestContext {
    RequestContext::new(cancel)
        .with_identity(CallerIdentity::user(user))
        .with_params(params(&[
            ("project_id", "1"),
            ("cluster_id", "1"),
            ("namespace", "default"),
            ("name", release),
        ]))
}

fn request() -> Request {
    http::Request::builder()
        .uri(RELEASE_PATH)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn tracking_handler(called: &Arc<AtomicBool>) -> Handler {
    let called = Arc::clone(called);
    handler_fn(move |ctx: RequestContext, _req| {
        called.store(true, Ordering::SeqCst);
        async move {
            let release = ctx.get::<Release>().expect("release hydrated");
            Ok(http::Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from(release.chart.clone())))
                .unwrap())
        }
    })
}

fn build(repo: &Arc<InMemoryRepository>, verb: Verb, handler: Handler) -> Pipeline {
    Pipeline::for_endpoint(
        &release_descriptor(verb),
        repo.clone(),
        Arc::new(RepositoryPolicyLoader::new(repo.clone())),
        handler,
    )
}

async fn respond(pipeline: &Pipeline, ctx: RequestContext) -> Response {
    let meta = RequestMeta::new(ctx.request_id(), Method::GET, RELEASE_PATH);
    match pipeline.process(ctx, request()).await {
        Ok(response) => response,
        Err(failure) => ErrorReporter::new().report(
            &meta.with_failure(failure.stage(), failure.state()),
            failure.error(),
        ),
    }
}

async fn body(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn release_chain_reaches_handler() {
    let repo = Arc::new(fixtures::seeded());
    let called = Arc::new(AtomicBool::new(false));
    let pipeline = build(&repo, Verb::Read, tracking_handler(&called));

    let response = respond(&pipeline, release_ctx(DEVELOPER_USER, "app-1", CancellationToken::new())).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await, "web");
    assert!(called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn missing_release_is_forbidden_not_404() {
    let repo = Arc::new(fixtures::seeded());
    let called = Arc::new(AtomicBool::new(false));
    let pipeline = build(&repo, Verb::Read, tracking_handler(&called));

    let response = respond(&pipeline, release_ctx(ADMIN_USER, "app-9", CancellationToken::new())).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body(response).await,
        r#"{"error":"release with id app-9 not found in namespace default"}"#
    );
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failure_carries_stage_and_state() {
    let repo = Arc::new(fixtures::seeded());
    repo.fail(ReadTarget::Scope(ScopeKind::Namespace));
    let pipeline = build(
        &repo,
        Verb::Read,
        handler_fn(|_ctx, _req| async { Ok(empty_response(StatusCode::OK)) }),
    );

    let err = pipeline
        .process(release_ctx(ADMIN_USER, "app-1", CancellationToken::new()), request())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "hydrate");
    assert_eq!(err.state(), PipelineState::Hydrated(1));
    assert_eq!(err.error().status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn cancellation_during_hydration_skips_handler() {
    let repo = Arc::new(fixtures::seeded());
    repo.block(ReadTarget::Scope(ScopeKind::Cluster));
    let called = Arc::new(AtomicBool::new(false));
    let pipeline = Arc::new(build(&repo, Verb::Read, tracking_handler(&called)));

    let cancel = CancellationToken::new();
    let ctx = release_ctx(ADMIN_USER, "app-1", cancel.clone());
    let task = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { respond(&pipeline, ctx).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let response = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("pipeline did not observe cancellation")
        .unwrap();
    assert_eq!(response.status().as_u16(), 499);
    assert!(!called.load(Ordering::SeqCst));
    assert!(!repo.was_read(ReadTarget::Scope(ScopeKind::Namespace)));
}
