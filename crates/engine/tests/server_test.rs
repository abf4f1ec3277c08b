use async_trait::async_trait;
use axum::http::StatusCode;
use easytrain_engine::{
    controller::WorkflowController,
    delegates::{ProgressSender, ServiceDelegate, StepDelegate},
    pipeline::PipelineStep,
    server::Server,
    service::ServiceConfig,
    store::{create_store, DatabaseConfig},
    Result,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Reports a couple of progress ticks and succeeds immediately.
struct ImmediateDelegate;

#[async_trait]
impl StepDelegate for ImmediateDelegate {
    async fn run(&self, _step: &PipelineStep, progress: ProgressSender) -> Result<()> {
        let _ = progress.send(50).await;
        Ok(())
    }
}

struct OkServiceDelegate;

#[async_trait]
impl ServiceDelegate for OkServiceDelegate {
    async fn start(&self, _config: &ServiceConfig) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

async fn test_server() -> axum_test::TestServer {
    let database_config = DatabaseConfig {
        sqlite_path: PathBuf::from(":memory:"),
        max_connections: 1,
    };

    let store = create_store(&database_config)
        .await
        .expect("failed to create store");
    store.init().await.expect("failed to initialize store");

    let controller = WorkflowController::load(
        store,
        Arc::new(ImmediateDelegate),
        Arc::new(OkServiceDelegate),
        100,
    )
    .await;

    let server = Server::new(controller);
    axum_test::TestServer::new(server.build_router()).unwrap()
}

async fn wait_for_step_completed(client: &axum_test::TestServer, step_id: &str) {
    for _ in 0..500 {
        let response = client.get("/api/pipeline").await;
        let body: serde_json::Value = response.json();
        let done = body["steps"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s["id"] == step_id && s["status"] == "completed");
        if done {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("step {} never completed", step_id);
}

#[tokio::test]
async fn test_pipeline_endpoints() {
    let client = test_server().await;

    // Health endpoint
    let response = client.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");

    // The default topology is served with the cursor at the first step
    let response = client.get("/api/pipeline").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["cursor"], 0);
    assert_eq!(body["steps"].as_array().unwrap().len(), 11);
    assert_eq!(body["steps"][0]["id"], "setup");
    assert_eq!(body["steps"][0]["status"], "pending");

    // Gated step is rejected with 412 and nothing changes
    let response = client.post("/api/steps/questions/execute").await;
    assert_eq!(response.status_code(), StatusCode::PRECONDITION_FAILED);

    // Unknown step
    let response = client.post("/api/steps/nope/execute").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    // Executing the first step is accepted and yields a task id
    let response = client.post("/api/steps/setup/execute").await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    let task_id = body["task_id"].as_str().unwrap().to_string();
    assert!(task_id.starts_with("setup-"));

    wait_for_step_completed(&client, "setup").await;

    // The cursor auto-advanced past the completed step
    let response = client.get("/api/pipeline").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["cursor"], 1);

    // The execution attempt is visible in the task list
    let response = client.get("/api/tasks").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let tasks: Vec<serde_json::Value> = response.json();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], task_id.as_str());
    assert_eq!(tasks[0]["status"], "success");
    assert_eq!(tasks[0]["progress"], 100);

    // Step transitions were logged with the step id as source
    let response = client.get("/api/logs?source=setup").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let logs: Vec<serde_json::Value> = response.json();
    assert!(!logs.is_empty());
    assert!(logs.iter().all(|e| e["source"] == "setup"));

    // Export renders one line per entry
    let response = client.get("/api/logs/export?source=setup").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let text = response.text();
    assert!(text.lines().count() >= 2);
    assert!(text.lines().all(|l| l.starts_with('[')));

    // Operator removes the finished task
    let response = client.delete(&format!("/api/tasks/{}", task_id)).await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    let tasks: Vec<serde_json::Value> = client.get("/api/tasks").await.json();
    assert!(tasks.is_empty());

    // Manual cursor navigation, bounds checked
    let response = client.post("/api/pipeline/cursor").json(&json!({ "index": 5 })).await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    let body: serde_json::Value = client.get("/api/pipeline").await.json();
    assert_eq!(body["cursor"], 5);
    let response = client.post("/api/pipeline/cursor").json(&json!({ "index": 99 })).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    // Operator override with an invalid status string
    let response = client
        .post("/api/steps/deploy/status")
        .json(&json!({ "status": "in-progress" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let response = client
        .post("/api/steps/deploy/status")
        .json(&json!({ "status": "completed" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_log_endpoints() {
    let client = test_server().await;

    // "warning" is accepted as an alias for warn
    let response = client
        .post("/api/logs")
        .json(&json!({
            "level": "warning",
            "source": "frontend",
            "message": "labeling queue is getting long"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let response = client.get("/api/logs?levels=warn").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let logs: Vec<serde_json::Value> = response.json();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["level"], "warn");

    // Case-insensitive search
    let logs: Vec<serde_json::Value> = client.get("/api/logs?search=LABELING").await.json();
    assert_eq!(logs.len(), 1);

    // Bad level names are rejected
    let response = client.get("/api/logs?levels=fatal").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    // Clearing empties the store
    let response = client.delete("/api/logs").await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    let logs: Vec<serde_json::Value> = client.get("/api/logs").await.json();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn test_service_endpoints() {
    let client = test_server().await;

    let response = client.get("/api/service").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["is_running"], false);
    assert!(body["last_health_check"].is_null());

    let response = client
        .post("/api/service/start")
        .json(&json!({ "server_path": "/opt/mcp", "port": 9000 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let body: serde_json::Value = client.get("/api/service").await.json();
    assert_eq!(body["is_running"], true);
    assert_eq!(body["config"]["server_path"], "/opt/mcp");
    assert_eq!(body["config"]["port"], 9000);
    assert!(!body["last_health_check"].is_null());

    let response = client.post("/api/service/health").await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let response = client.post("/api/service/stop").await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    let body: serde_json::Value = client.get("/api/service").await.json();
    assert_eq!(body["is_running"], false);
    // the last successful check stays visible after a stop
    assert!(!body["last_health_check"].is_null());
}
