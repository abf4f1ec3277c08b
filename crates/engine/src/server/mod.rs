mod routes;
mod websocket;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{controller::WorkflowController, Result};

pub struct Server {
    controller: Arc<WorkflowController>,
}

impl Server {
    pub fn new(controller: Arc<WorkflowController>) -> Self {
        Self { controller }
    }

    pub fn build_router(self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .route("/api/pipeline", get(routes::get_pipeline))
            .route("/api/pipeline/cursor", post(routes::set_cursor))
            .route("/api/steps/{id}/execute", post(routes::execute_step))
            .route("/api/steps/{id}/cancel", post(routes::cancel_step))
            .route("/api/steps/{id}/status", post(routes::override_status))
            .route("/api/tasks", get(routes::list_tasks))
            .route("/api/tasks/{id}", delete(routes::remove_task))
            .route(
                "/api/logs",
                get(routes::query_logs)
                    .post(routes::append_log)
                    .delete(routes::clear_logs),
            )
            .route("/api/logs/export", get(routes::export_logs))
            .route("/api/service", get(routes::get_service))
            .route("/api/service/config", post(routes::update_service_config))
            .route("/api/service/start", post(routes::start_service))
            .route("/api/service/stop", post(routes::stop_service))
            .route("/api/service/health", post(routes::check_service))
            .route("/ws", get(websocket::ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.controller)
    }

    pub async fn start(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.build_router()).await?;
        Ok(())
    }
}
