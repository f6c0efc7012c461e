//! REST surface tests driven directly against the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use webpilot::server::{build_router, ServeState};
use webpilot::{AgentRuntime, SafetyPolicy, ScriptedPlanner};

fn app(runtime: Arc<AgentRuntime>) -> Router {
    build_router(ServeState::new(runtime))
}

fn runtime_with_planner(responses: Vec<&str>) -> Arc<AgentRuntime> {
    let runtime = AgentRuntime::new(SafetyPolicy::default());
    runtime.set_planner(Arc::new(ScriptedPlanner::new(responses)));
    runtime
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app(runtime_with_planner(vec![]));
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn tools_lists_the_full_catalog() {
    let app = app(runtime_with_planner(vec![]));
    let response = app.oneshot(get("/tools")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 7);
    assert!(tools.iter().any(|tool| tool["name"] == "navigate"));
    let finish = tools.iter().find(|tool| tool["name"] == "finish").unwrap();
    assert_eq!(finish["schema"]["status"]["required"], json!(true));
}

#[tokio::test]
async fn create_task_returns_created_with_the_task() {
    let runtime = runtime_with_planner(vec![
        r#"{"thought":"done","finish":{"status":"success","summary":"ok"}}"#,
    ]);
    let app = app(runtime);

    let response = app
        .oneshot(post_json(
            "/tasks",
            json!({ "goal": "Open example.com", "context": { "url": "https://example.com" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["task"]["goal"], "Open example.com");
    assert_eq!(body["task"]["context"]["url"], "https://example.com");
    assert!(body["task"]["id"].is_string());
}

#[tokio::test]
async fn create_task_with_blank_goal_is_a_bad_request() {
    let app = app(runtime_with_planner(vec![]));
    let response = app
        .oneshot(post_json("/tasks", json!({ "goal": "   " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("must not be empty"));
}

#[tokio::test]
async fn create_task_without_planner_is_a_bad_request() {
    let runtime = AgentRuntime::new(SafetyPolicy::default());
    let app = app(runtime);
    let response = app
        .oneshot(post_json("/tasks", json!({ "goal": "Open example.com" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("No planner"));
}

#[tokio::test]
async fn create_task_with_malformed_body_is_a_bad_request() {
    let app = app(runtime_with_planner(vec![]));
    let request = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn task_detail_round_trips_and_unknown_ids_are_404() {
    let runtime = runtime_with_planner(vec![
        r#"{"thought":"done","finish":{"status":"success","summary":"ok"}}"#,
    ]);
    let task = runtime.create_task("Open example.com", None).unwrap();
    let router = app(runtime);

    let response = router
        .clone()
        .oneshot(get(&format!("/tasks/{}", task.id.0)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["task"]["id"], json!(task.id.0));

    let response = router.oneshot(get("/tasks/does-not-exist")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Task not found.");
}

#[tokio::test]
async fn task_list_is_reverse_chronological() {
    let runtime = runtime_with_planner(vec![
        r#"{"thought":"done","finish":{"status":"success","summary":"one"}}"#,
        r#"{"thought":"done","finish":{"status":"success","summary":"two"}}"#,
    ]);
    let first = runtime.create_task("first", None).unwrap();
    let second = runtime.create_task("second", None).unwrap();
    let router = app(runtime);

    let response = router.oneshot(get("/tasks")).await.unwrap();
    let body = body_json(response).await;
    let tasks = body["tasks"].as_array().unwrap();
    assert_eq!(tasks[0]["id"], json!(second.id.0));
    assert_eq!(tasks[1]["id"], json!(first.id.0));
}

#[tokio::test]
async fn unknown_paths_are_404() {
    let app = app(runtime_with_planner(vec![]));
    let response = app.oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_exposition_is_served() {
    let app = app(runtime_with_planner(vec![]));
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("webpilot_"));
}
