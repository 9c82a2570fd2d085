//! Pipeline-wide properties: hierarchy, scoping, cancellation, isolation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use http::{Method, StatusCode};
use proptest::prelude::*;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use warden_core::fixtures::ReadTarget;
use warden_core::{Cluster, EndpointDescriptor, PolicyDocument, Project, ScopeKind, Verb};
use warden_router::RouteError;
use warden_server::RegistrationError;
use warden_test::fixtures::{self, ADMIN_USER, DEVELOPER_USER, VIEWER_USER};
use warden_test::{registry_for, TestClient};

use common::{app, describe, register, repository, Calls};

#[test]
fn registration_rejects_reversed_or_rootless_scopes() {
    let repo = repository();
    let calls = Calls::default();

    for scopes in [
        vec![ScopeKind::Cluster, ScopeKind::Project],
        vec![ScopeKind::Cluster],
        vec![ScopeKind::Project, ScopeKind::Namespace],
        vec![],
    ] {
        let err = register(registry_for(&repo), &calls)
            .route(
                "/extra/{project_id}/{cluster_id}/{namespace}",
                EndpointDescriptor::builder(Method::GET)
                    .verb(Verb::Read)
                    .scopes(scopes.clone()),
                describe(&calls),
            )
            .build()
            .unwrap_err();
        assert!(
            matches!(err, RegistrationError::Descriptor { .. }),
            "{scopes:?}: {err}"
        );
        assert_eq!(err.template(), "/extra/{project_id}/{cluster_id}/{namespace}");
    }
}

#[test]
fn registration_rejects_conflicting_capture_names() {
    let repo = repository();
    let calls = Calls::default();

    // Valid on its own, but `{id}` sits where other templates capture `{cluster_id}`.
    let err = register(registry_for(&repo), &calls)
        .route(
            "/projects/{project_id}/clusters/{id}/logs",
            EndpointDescriptor::builder(Method::GET)
                .verb(Verb::Read)
                .scopes([ScopeKind::Project]),
            describe(&calls),
        )
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Route {
            source: RouteError::ParamName { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn every_endpoint_hydrates_its_full_chain() {
    let repo = repository();
    let calls = Calls::default();
    let client = app(&repo, &calls).as_user(ADMIN_USER);

    let cases: &[(Method, &str, Verb, &[&str])] = &[
        (Method::GET, "/projects/1", Verb::Read, &["project"]),
        (
            Method::GET,
            "/projects/1/clusters/1/namespaces/default",
            Verb::Read,
            &["project", "cluster", "namespace"],
        ),
        (
            Method::GET,
            "/projects/1/clusters/1/namespaces/default/stacks/stack-1",
            Verb::Read,
            &["project", "cluster", "namespace", "stack"],
        ),
        (Method::GET, "/projects/1/registries/1", Verb::Read, &["project", "registry"]),
        (Method::GET, "/projects/1/helm-repos/1", Verb::Read, &["project", "helm_repo"]),
        (
            Method::GET,
            "/projects/1/git-installations/1",
            Verb::Read,
            &["project", "git_installation"],
        ),
        (
            Method::GET,
            "/projects/1/integrations/gitlab/1",
            Verb::Read,
            &["project", "gitlab_integration"],
        ),
        (
            Method::GET,
            "/projects/1/infras/1/operations/op-1",
            Verb::Read,
            &["project", "infra", "operation"],
        ),
        (Method::GET, "/projects/1/invites/1", Verb::Read, &["project", "invite"]),
        (
            Method::GET,
            "/projects/1/targets/0190b1c2-7d3e-7f00-8000-000000007a67",
            Verb::Read,
            &["project", "deployment_target"],
        ),
        (Method::POST, "/projects/1/clusters/1", Verb::Create, &["project", "cluster"]),
    ];

    for (method, path, verb, kinds) in cases {
        let response = client.request(method.clone(), *path).send().await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json().unwrap();
        assert_eq!(body["hydrated"], json!(kinds), "{method} {path}");
        // Every level of the chain carries the endpoint's declared verb.
        assert_eq!(
            body["verbs"],
            json!(vec![verb.as_str(); kinds.len()]),
            "{method} {path}"
        );
    }
}

#[tokio::test]
async fn resources_of_other_projects_are_forbidden_not_missing() {
    let repo = repository();
    let calls = Calls::default();
    let client = app(&repo, &calls).as_user(ADMIN_USER);

    client
        .get("/projects/1/clusters/2")
        .send()
        .await
        .assert_status(StatusCode::FORBIDDEN)
        .assert_error("cluster with id 2 not found in project 1");

    // Same request against a backend that ignores parent ids.
    let unscoped = repository();
    unscoped.unscoped();
    let client = app(&unscoped, &calls).as_user(ADMIN_USER);
    let response = client.get("/projects/1/clusters/2").send().await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.error_message().unwrap(), "Forbidden");

    assert_eq!(calls.count(), 0);
}

#[tokio::test]
async fn missing_resources_never_return_404() {
    let repo = repository();
    let calls = Calls::default();
    let client = app(&repo, &calls).as_user(ADMIN_USER);

    let cases = [
        ("/projects/1/clusters/9", "cluster with id 9 not found in project 1"),
        (
            "/projects/1/clusters/1/namespaces/kube-system",
            "namespace with id kube-system not found in cluster 1",
        ),
        (
            "/projects/1/clusters/1/apps/default/app-9",
            "release with id app-9 not found in namespace default",
        ),
        (
            "/projects/1/clusters/1/namespaces/default/stacks/stack-9",
            "stack with id stack-9 not found in namespace default",
        ),
        ("/projects/1/registries/9", "registry with id 9 not found in project 1"),
        ("/projects/1/helm-repos/9", "helm repo with id 9 not found in project 1"),
        (
            "/projects/1/git-installations/9",
            "git installation with id 9 not found in project 1",
        ),
        (
            "/projects/1/integrations/gitlab/9",
            "gitlab integration with id 9 not found in project 1",
        ),
        ("/projects/1/infras/9", "infra with id 9 not found in project 1"),
        (
            "/projects/1/infras/1/operations/op-9",
            "operation with id op-9 not found in infra 1",
        ),
        ("/projects/1/invites/9", "invite with id 9 not found in project 1"),
        (
            "/projects/1/targets/550e8400-e29b-41d4-a716-446655440000",
            "deployment target with id 550e8400-e29b-41d4-a716-446655440000 not found in project 1",
        ),
    ];

    for (path, message) in cases {
        client
            .get(path)
            .send()
            .await
            .assert_status(StatusCode::FORBIDDEN)
            .assert_error(message);
    }

    // A project the caller has no policies in is denied before hydration.
    let response = client.get("/projects/99").send().await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(calls.count(), 0);
}

#[tokio::test]
async fn cancellation_during_policy_load() {
    let repo = repository();
    repo.block(ReadTarget::UserPolicies);
    let calls = Calls::default();
    let client = app(&repo, &calls).as_user(ADMIN_USER);

    let cancel = CancellationToken::new();
    let task = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            client.get("/projects/1/clusters/1").send_with_cancel(cancel).await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let response = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("cancellation not observed")
        .unwrap();
    response.assert_status_code(499).assert_empty_body();
    assert_eq!(calls.count(), 0);
    assert!(!repo.was_read(ReadTarget::Scope(ScopeKind::Project)));
}

#[tokio::test]
async fn cancellation_during_hydration() {
    let repo = repository();
    repo.block(ReadTarget::Scope(ScopeKind::Namespace));
    let calls = Calls::default();
    let client = app(&repo, &calls).as_user(ADMIN_USER);

    let cancel = CancellationToken::new();
    let task = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            client
                .get("/projects/1/clusters/1/apps/default/app-1")
                .send_with_cancel(cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let response = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("cancellation not observed")
        .unwrap();
    response.assert_status_code(499);
    assert_eq!(calls.count(), 0);
    assert!(!repo.was_read(ReadTarget::Scope(ScopeKind::Release)));
}

#[tokio::test]
async fn request_deadline_cancels_slow_reads() {
    let repo = repository();
    repo.block(ReadTarget::Scope(ScopeKind::Cluster));
    let calls = Calls::default();
    let registry = register(registry_for(&repo), &calls)
        .request_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let client = TestClient::new(registry).as_user(ADMIN_USER);

    let response = tokio::time::timeout(
        Duration::from_secs(1),
        client.get("/projects/1/clusters/1").send(),
    )
    .await
    .expect("deadline not enforced");
    response.assert_status_code(499);
    assert_eq!(calls.count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_see_only_their_own_context() {
    let repo = repository();
    repo.set_latency(Duration::from_millis(2));
    let calls = Calls::default();
    let client = app(&repo, &calls);
    let users = [ADMIN_USER, DEVELOPER_USER, VIEWER_USER];

    let requests = (0..48).map(|i| {
        let client = client.clone();
        let user = users[i % users.len()];
        let request_id = Uuid::now_v7();
        let path = if i % 2 == 0 {
            "/projects/1/clusters/1".to_string()
        } else {
            "/projects/1/clusters/1/apps/default/app-1".to_string()
        };
        tokio::spawn(async move {
            let response = client
                .get(path.clone())
                .as_user(user)
                .header("x-request-id", request_id.to_string())
                .send()
                .await;
            (user, request_id, path, response)
        })
    });

    for result in join_all(requests).await {
        let (user, request_id, path, response) = result.unwrap();
        response.assert_status(StatusCode::OK);
        let body: Value = response.json().unwrap();
        assert_eq!(body["request_id"], json!(request_id.to_string()));
        assert_eq!(body["caller"], json!(format!("user:{user}")));
        let expected_leaf = if path.ends_with("app-1") { "release" } else { "cluster" };
        let hydrated = body["hydrated"].as_array().unwrap();
        assert_eq!(hydrated.last(), Some(&json!(expected_leaf)));
    }
    assert_eq!(calls.count(), 48);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn chain_covers_every_declared_scope(project_id in 1u64..10_000, cluster_id in 1u64..10_000) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let repo = Arc::new(fixtures::InMemoryRepository::new());
        repo.insert_project(Project { id: project_id, ..Project::default() })
            .insert_cluster(Cluster { id: cluster_id, project_id, ..Cluster::default() })
            .grant(project_id, ADMIN_USER, PolicyDocument::admin(project_id));
        let calls = Calls::default();
        let client = app(&repo, &calls).as_user(ADMIN_USER);

        let body: Value = runtime.block_on(async {
            let response = client
                .post(format!("/projects/{project_id}/clusters/{cluster_id}"))
                .send()
                .await;
            response.assert_status(StatusCode::OK);
            response.json().unwrap()
        });

        prop_assert_eq!(
            &body["chain"],
            &json!([["project", project_id.to_string()], ["cluster", cluster_id.to_string()]])
        );
        prop_assert_eq!(&body["cluster_project"], &json!(project_id));
    }
}
