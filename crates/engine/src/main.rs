use std::sync::Arc;
use tracing::info;

use easytrain_engine::{
    config::Config,
    controller::WorkflowController,
    delegates::{HttpServiceDelegate, HttpStepDelegate},
    metrics,
    server::Server,
    store::create_store,
    Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::load()?;
    info!("loaded configuration: {:?}", config);

    metrics::register_metrics();

    // Initialize durable state
    let store = create_store(&config.database).await?;
    store.init().await?;

    // Delegates live in the training backend; the engine only talks to them
    let step_delegate = Arc::new(HttpStepDelegate::new(config.backend.base_url.clone()));
    let service_delegate = Arc::new(HttpServiceDelegate::new(config.backend.base_url.clone()));

    let controller =
        WorkflowController::load(store, step_delegate, service_delegate, config.logs.capacity)
            .await;

    let server = Server::new(controller);
    info!("starting server on {}", config.server.addr);
    server.start(&config.server.addr).await
}
