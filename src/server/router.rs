use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::instrument;

use crate::errors::AgentError;
use crate::metrics;
use crate::server::{ws, ServeState};
use crate::types::{TaskContext, TaskId};

pub fn build_router(state: ServeState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(tools_handler))
        .route("/tasks", get(list_tasks_handler).post(create_task_handler))
        .route("/tasks/:task_id", get(get_task_handler))
        .route("/metrics", get(metrics_handler))
        .merge(ws::router())
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[instrument(name = "api.tools", skip(state))]
async fn tools_handler(State(state): State<ServeState>) -> Json<Value> {
    Json(json!({ "tools": state.runtime.registry().list() }))
}

#[instrument(name = "api.tasks.list", skip(state))]
async fn list_tasks_handler(State(state): State<ServeState>) -> Json<Value> {
    Json(json!({ "tasks": state.runtime.list_tasks() }))
}

#[instrument(name = "api.tasks.detail", skip(state))]
async fn get_task_handler(
    State(state): State<ServeState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    match state.runtime.get_task(&TaskId(task_id)) {
        Some(task) => Json(json!({ "task": task })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Task not found." })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest {
    goal: String,
    #[serde(default)]
    context: Option<TaskContext>,
}

#[instrument(name = "api.tasks.create", skip(state, payload))]
async fn create_task_handler(
    State(state): State<ServeState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    match state.runtime.create_task(&request.goal, request.context) {
        Ok(task) => (StatusCode::CREATED, Json(json!({ "task": task }))).into_response(),
        Err(err) => error_response(&err).into_response(),
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::render() {
        Some(body) => body.into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "metric encode error" })),
        )
            .into_response(),
    }
}

fn error_response(err: &AgentError) -> (StatusCode, Json<Value>) {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": err.to_string() })))
}
