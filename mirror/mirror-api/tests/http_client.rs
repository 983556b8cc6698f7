//! HttpApiClient against a local axum server standing in for the remote API.

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use mirror_api::{ApiAuth, ApiClientConfig, Environment, HttpApiClient, QueryParams, RemoteApi};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct Hits {
    flaky: AtomicUsize,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer test-token")
}

async fn project(Path(id): Path<String>, Query(query): Query<HashMap<String, String>>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::FORBIDDEN, axum::Json(json!({"error": {"code": "forbidden", "message": "Not authorized"}})));
    }
    if id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            axum::Json(json!({"error": {"code": "not_found", "message": "Project not found"}})),
        );
    }
    (
        StatusCode::OK,
        axum::Json(json!({
            "id": id,
            "name": "web",
            "createdAt": 1,
            "accountId": query.get("teamId").cloned().unwrap_or_default(),
        })),
    )
}

async fn deployments(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    axum::Json(json!({
        "deployments": [
            {"uid": "dpl_1", "name": "web", "createdAt": 10, "state": "READY"},
            {"uid": "dpl_broken"},
            {"uid": "dpl_2", "name": "web", "createdAt": 5, "state": query.get("state").cloned().unwrap_or_default()},
        ]
    }))
}

async fn flaky(State(hits): State<Arc<Hits>>) -> impl IntoResponse {
    if hits.flaky.fetch_add(1, Ordering::SeqCst) == 0 {
        (StatusCode::SERVICE_UNAVAILABLE, axum::Json(json!({})))
    } else {
        (StatusCode::OK, axum::Json(json!({"id": "dpl_9", "name": "web", "createdAt": 1})))
    }
}

async fn file_content() -> impl IntoResponse {
    // "hello" in base64
    axum::Json(json!({"data": "aGVsbG8="}))
}

async fn events() -> impl IntoResponse {
    axum::Json(json!([
        {"type": "stdout", "created": 1000, "text": "Cloning"},
        {"type": "deployment-state", "created": 2000},
    ]))
}

async fn envs() -> impl IntoResponse {
    axum::Json(json!({"env": {"API_KEY": "abc", "COUNT": 3}}))
}

async fn start_server() -> (String, Arc<Hits>) {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/v4/projects/{id}", get(project))
        .route("/v6/deployments", get(deployments))
        .route("/v13/deployments/{id}", get(flaky))
        .route("/v7/deployments/{id}/files/get", get(file_content))
        .route("/v3/deployments/{id}/events", get(events))
        .route("/v2/env/pull/{project}/{target}", get(envs))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), hits)
}

fn client(base_url: String) -> HttpApiClient {
    HttpApiClient::new(ApiClientConfig {
        base_url,
        retry_delay_ms: 10,
        ..ApiClientConfig::default()
    })
    .unwrap()
}

fn auth() -> ApiAuth {
    ApiAuth::new("test-token").with_team(Some("team_1"))
}

#[tokio::test]
async fn test_project_lookup_sends_team_and_token() {
    let (base, _) = start_server().await;
    let project = client(base).get_project_by_name_or_id("prj_1", &auth()).await.unwrap();
    assert_eq!(project.id, "prj_1");
    assert_eq!(project.account_id, "team_1");
}

#[tokio::test]
async fn test_not_found_and_forbidden_are_typed() {
    let (base, _) = start_server().await;
    let api = client(base);

    let err = api.get_project_by_name_or_id("missing", &auth()).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("Project not found"));

    let err = api
        .get_project_by_name_or_id("prj_1", &ApiAuth::new("wrong"))
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn test_deployment_list_drops_invalid_items_and_forwards_filters() {
    let (base, _) = start_server().await;
    let mut query = QueryParams::new();
    query.append("state", "QUEUED");

    let deployments = client(base)
        .list_deployments_by_project_id("prj_1", &query, &auth())
        .await
        .unwrap();

    let ids: Vec<&str> = deployments.iter().map(|d| d.uid.as_str()).collect();
    assert_eq!(ids, vec!["dpl_1", "dpl_2"]);
    assert_eq!(deployments[1].state, Some(mirror_api::DeploymentState::Queued));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let (base, hits) = start_server().await;
    let deployment = client(base).get_deployment_by_id("dpl_9", &auth()).await.unwrap();
    assert_eq!(deployment.uid, "dpl_9");
    assert_eq!(hits.flaky.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_content_events_and_envs() {
    let (base, _) = start_server().await;
    let api = client(base);

    let bytes = api.get_deployment_file_content("dpl_1", "index.html", &auth()).await.unwrap();
    assert_eq!(bytes, b"hello");

    let events = api.get_deployment_events("dpl_1", &auth()).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].text.as_deref(), Some("Cloning"));

    let env = api
        .pull_project_envs("prj_1", Environment::Development, &auth())
        .await
        .unwrap();
    assert_eq!(env.len(), 1);
    assert_eq!(env["API_KEY"], "abc");
}
