//! REST API route handlers.
//!
//! Two endpoints: synchronous task dispatch at `POST /`, and a plain-text
//! counter dump at `GET /status`.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use renderd_core::Task;

use crate::state::AppState;

const DEFAULT_PRIORITY: i64 = 10;

/// Body accepted by `POST /`. Everything beyond `id`, `command`, and
/// `priority` is forwarded to the worker as part of the request document.
#[derive(Deserialize)]
pub struct DispatchRequest {
    pub id: Option<String>,
    pub priority: Option<i64>,
    #[serde(flatten)]
    pub doc: Value,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "status": "error", "error_message": message.into() })),
    )
        .into_response()
}

/// `POST /` — submit a task and block for its result.
pub async fn dispatch(
    State(state): State<AppState>,
    Json(request): Json<DispatchRequest>,
) -> Response {
    let id = request
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let priority = request.priority.unwrap_or(DEFAULT_PRIORITY);
    let task = Task::new(id, request.doc, Some(priority));

    tracing::info!(task = %task.id, "got request");
    match state.broker.dispatch(task).await {
        Ok(result) => {
            tracing::info!(task = %result.id, "got response");
            Json(result.doc).into_response()
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {err}")),
    }
}

/// `GET /status` — plain-text `running`/`waiting`/`worker` counters.
pub async fn status(State(state): State<AppState>) -> Response {
    match state.broker.status().await {
        Ok(status) => format!(
            "running: {}\nwaiting: {}\nworker: {}\n",
            status.running, status.waiting, status.pool_size
        )
        .into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {err}")),
    }
}

/// Fallback handler for any path other than `/` and `/status`.
pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "endpoint not found")
}
