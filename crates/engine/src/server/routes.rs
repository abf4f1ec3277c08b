use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use http::{header, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    controller::WorkflowController,
    logs::{LogFilter, LogLevel},
    pipeline::StepStatus,
    service::ServiceConfig,
    EngineError,
};

fn error_response(err: EngineError) -> Response {
    let status = match &err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::AlreadyRunning(_) | EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::DependencyNotSatisfied(_) => StatusCode::PRECONDITION_FAILED,
        EngineError::Config(_) => StatusCode::BAD_REQUEST,
        EngineError::DelegateFailure(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn metrics() -> String {
    crate::metrics::gather_metrics()
}

pub async fn get_pipeline(State(controller): State<Arc<WorkflowController>>) -> Response {
    Json(controller.pipeline_snapshot().await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CursorRequest {
    pub index: usize,
}

pub async fn set_cursor(
    State(controller): State<Arc<WorkflowController>>,
    Json(request): Json<CursorRequest>,
) -> Response {
    match controller.set_cursor(request.index).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn execute_step(
    State(controller): State<Arc<WorkflowController>>,
    Path(id): Path<String>,
) -> Response {
    match controller.execute_step(&id).await {
        Ok(task_id) => {
            (StatusCode::ACCEPTED, Json(json!({ "task_id": task_id }))).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn cancel_step(
    State(controller): State<Arc<WorkflowController>>,
    Path(id): Path<String>,
) -> Response {
    match controller.cancel_step(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusOverrideRequest {
    pub status: String,
}

pub async fn override_status(
    State(controller): State<Arc<WorkflowController>>,
    Path(id): Path<String>,
    Json(request): Json<StatusOverrideRequest>,
) -> Response {
    let status: StepStatus = match request.status.parse() {
        Ok(status) => status,
        Err(e) => return error_response(e),
    };
    match controller.override_step_status(&id, status).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn list_tasks(State(controller): State<Arc<WorkflowController>>) -> Response {
    Json(controller.tasks_snapshot().await).into_response()
}

pub async fn remove_task(
    State(controller): State<Arc<WorkflowController>>,
    Path(id): Path<String>,
) -> StatusCode {
    controller.remove_task(&id).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub source: Option<String>,
    /// Comma-separated level names, e.g. `error,warn`.
    pub levels: Option<String>,
    pub search: Option<String>,
}

fn parse_filter(query: LogQuery) -> crate::Result<LogFilter> {
    let levels = match query.levels {
        Some(raw) => {
            let mut set = HashSet::new();
            for part in raw.split(',').filter(|p| !p.is_empty()) {
                set.insert(part.trim().parse::<LogLevel>()?);
            }
            Some(set)
        }
        None => None,
    };
    Ok(LogFilter {
        source: query.source,
        levels,
        search_term: query.search,
    })
}

pub async fn query_logs(
    State(controller): State<Arc<WorkflowController>>,
    Query(query): Query<LogQuery>,
) -> Response {
    match parse_filter(query) {
        Ok(filter) => Json(controller.logs(&filter).await).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AppendLogRequest {
    pub level: String,
    pub source: String,
    pub message: String,
}

pub async fn append_log(
    State(controller): State<Arc<WorkflowController>>,
    Json(request): Json<AppendLogRequest>,
) -> Response {
    let level: LogLevel = match request.level.parse() {
        Ok(level) => level,
        Err(e) => return error_response(e),
    };
    let id = controller.append_log(level, request.source, request.message).await;
    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

pub async fn clear_logs(State(controller): State<Arc<WorkflowController>>) -> StatusCode {
    controller.clear_logs().await;
    StatusCode::NO_CONTENT
}

pub async fn export_logs(
    State(controller): State<Arc<WorkflowController>>,
    Query(query): Query<LogQuery>,
) -> Response {
    match parse_filter(query) {
        Ok(filter) => {
            let text = controller.export_logs(&filter).await;
            (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                text,
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn get_service(State(controller): State<Arc<WorkflowController>>) -> Response {
    Json(controller.service_snapshot().await).into_response()
}

pub async fn update_service_config(
    State(controller): State<Arc<WorkflowController>>,
    Json(config): Json<ServiceConfig>,
) -> StatusCode {
    controller.update_service_config(config).await;
    StatusCode::NO_CONTENT
}

pub async fn start_service(
    State(controller): State<Arc<WorkflowController>>,
    Json(config): Json<ServiceConfig>,
) -> Response {
    match controller.start_service(config).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn stop_service(State(controller): State<Arc<WorkflowController>>) -> Response {
    match controller.stop_service().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn check_service(State(controller): State<Arc<WorkflowController>>) -> Response {
    match controller.check_service().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}
