//! Shared endpoint table for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use serde_json::json;
use uuid::Uuid;
use warden_core::{
    ApiContractRevision, CallerIdentity, DeploymentTarget, EndpointDescriptor, FeatureGate,
    RequestContext, ScopeKind, Verb,
};
use warden_middleware::{handler_fn, Handler};
use warden_server::EndpointRegistryBuilder;
use warden_test::fixtures::{self, InMemoryRepository};
use warden_test::{registry_for, TestClient};

pub const REVISION_ID: &str = "0190b1c2-7d3e-7f00-8000-00000000c0de";
pub const TARGET_ID: &str = "0190b1c2-7d3e-7f00-8000-000000007a67";

use ScopeKind::{
    ApiContractRevision as Revision, Cluster, DeploymentTarget as Target, GitInstallation,
    GitlabIntegration, HelmRepo, Infra, Invite, Namespace, Operation, Project, Registry, Release,
    Stack,
};

/// `(method, template, verb, scopes, gates)` for every endpoint in the app.
pub const ENDPOINTS: &[(&str, &str, Verb, &[ScopeKind], &[FeatureGate])] = &[
    ("GET", "/projects/{project_id}", Verb::Read, &[Project], &[]),
    ("GET", "/projects/{project_id}/clusters/{cluster_id}", Verb::Read, &[Project, Cluster], &[]),
    ("POST", "/projects/{project_id}/clusters/{cluster_id}", Verb::Create, &[Project, Cluster], &[]),
    (
        "GET",
        "/projects/{project_id}/clusters/{cluster_id}/namespaces/{namespace}",
        Verb::Read,
        &[Project, Cluster, Namespace],
        &[],
    ),
    (
        "GET",
        "/projects/{project_id}/clusters/{cluster_id}/apps/{namespace}/{name}",
        Verb::Read,
        &[Project, Cluster, Namespace, Release],
        &[],
    ),
    (
        "GET",
        "/projects/{project_id}/clusters/{cluster_id}/namespaces/{namespace}/stacks/{stack_id}",
        Verb::Read,
        &[Project, Cluster, Namespace, Stack],
        &[],
    ),
    (
        "POST",
        "/projects/{project_id}/clusters/{cluster_id}/namespaces/{namespace}/stacks",
        Verb::Create,
        &[Project, Cluster, Namespace],
        &[FeatureGate::Stacks],
    ),
    (
        "POST",
        "/projects/{project_id}/clusters/{cluster_id}/preview-environments",
        Verb::Create,
        &[Project, Cluster],
        &[FeatureGate::PreviewEnvironments],
    ),
    ("GET", "/projects/{project_id}/registries/{registry_id}", Verb::Read, &[Project, Registry], &[]),
    ("GET", "/projects/{project_id}/helm-repos/{helm_repo_id}", Verb::Read, &[Project, HelmRepo], &[]),
    (
        "GET",
        "/projects/{project_id}/git-installations/{git_installation_id}",
        Verb::Read,
        &[Project, GitInstallation],
        &[],
    ),
    (
        "GET",
        "/projects/{project_id}/integrations/gitlab/{integration_id}",
        Verb::Read,
        &[Project, GitlabIntegration],
        &[],
    ),
    ("GET", "/projects/{project_id}/infras/{infra_id}", Verb::Read, &[Project, Infra], &[]),
    (
        "GET",
        "/projects/{project_id}/infras/{infra_id}/operations/{operation_id}",
        Verb::Read,
        &[Project, Infra, Operation],
        &[],
    ),
    ("GET", "/projects/{project_id}/invites/{invite_id}", Verb::Read, &[Project, Invite], &[]),
    (
        "GET",
        "/projects/{project_id}/targets/{deployment_target_id}",
        Verb::Read,
        &[Project, Target],
        &[],
    ),
    (
        "GET",
        "/projects/{project_id}/contracts/revisions/{revision_id}",
        Verb::Read,
        &[Project, Revision],
        &[],
    ),
];

/// Seeded repository plus a deployment target and a contract revision.
pub fn repository() -> Arc<InMemoryRepository> {
    let repo = fixtures::seeded();
    repo.insert_deployment_target(DeploymentTarget {
        id: uuid(TARGET_ID),
        project_id: fixtures::PROJECT_ID,
        cluster_id: fixtures::CLUSTER_ID,
        namespace: fixtures::NAMESPACE.to_string(),
        is_preview: false,
    })
    .insert_api_contract_revision(ApiContractRevision {
        id: uuid(REVISION_ID),
        project_id: fixtures::PROJECT_ID,
    });
    Arc::new(repo)
}

pub fn uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap()
}

/// Counts handler invocations.
#[derive(Debug, Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Responds with what the pipeline put in the context.
pub fn describe(calls: &Calls) -> Handler {
    let calls = calls.clone();
    handler_fn(move |ctx: RequestContext, _req| {
        calls.0.fetch_add(1, Ordering::SeqCst);
        async move {
            let chain: Vec<_> = ctx
                .chain()
                .map(|chain| {
                    chain
                        .iter()
                        .map(|(kind, action)| json!([kind.as_str(), action.id.to_string()]))
                        .collect()
                })
                .unwrap_or_default();
            let body = json!({
                "request_id": ctx.request_id().to_string(),
                "caller": ctx.identity().map(CallerIdentity::log_id),
                "chain": chain,
                "verbs": ctx
                    .chain()
                    .map(|chain| chain.iter().map(|(_, action)| action.verb.as_str()).collect::<Vec<_>>())
                    .unwrap_or_default(),
                "hydrated": ctx.hydrated_kinds().map(ScopeKind::as_str).collect::<Vec<_>>(),
                "project": ctx.project().map(|p| p.id),
                "cluster_project": ctx.get::<warden_core::Cluster>().map(|c| c.project_id),
            });
            Ok(http::Response::builder()
                .status(StatusCode::OK)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(body.to_string())))
                .unwrap())
        }
    })
}

/// Registers every endpoint in [`ENDPOINTS`] with the [`describe`] handler.
pub fn register(mut builder: EndpointRegistryBuilder, calls: &Calls) -> EndpointRegistryBuilder {
    for (method, template, verb, scopes, gates) in ENDPOINTS {
        let mut descriptor = EndpointDescriptor::builder(Method::from_bytes(method.as_bytes()).unwrap())
            .verb(*verb)
            .scopes(scopes.iter().copied());
        for gate in *gates {
            descriptor = descriptor.gate(*gate);
        }
        builder = builder.route(*template, descriptor, describe(calls));
    }
    builder
}

/// A client over the full endpoint table.
pub fn app(repo: &Arc<InMemoryRepository>, calls: &Calls) -> TestClient {
    TestClient::new(register(registry_for(repo), calls).build().unwrap())
}
