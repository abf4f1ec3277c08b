use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{
    pipeline::PipelineStep,
    service::ServiceConfig,
    EngineError, Result,
};

use super::{ProgressSender, ServiceDelegate, StepDelegate};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct RunStatus {
    #[serde(default)]
    progress: u8,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Step delegate backed by the training backend's HTTP API: kicks off a run,
/// then polls its status until the backend reports a terminal state.
pub struct HttpStepDelegate {
    client: Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpStepDelegate {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl StepDelegate for HttpStepDelegate {
    async fn run(&self, step: &PipelineStep, progress: ProgressSender) -> Result<()> {
        let url = format!("{}/steps/{}/run", self.base_url, step.id);
        debug!("starting backend run for step {}", step.id);
        let response = self.client.post(&url).send().await?;
        if !response.status().is_success() {
            return Err(EngineError::DelegateFailure(format!(
                "backend returned {} when starting step '{}'",
                response.status(),
                step.id
            )));
        }

        let status_url = format!("{}/steps/{}/status", self.base_url, step.id);
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let status: RunStatus = self
                .client
                .get(&status_url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            // a closed receiver means the controller stopped listening
            let _ = progress.send(status.progress.min(100)).await;

            if status.done {
                return if status.ok {
                    Ok(())
                } else {
                    Err(EngineError::DelegateFailure(status.message.unwrap_or_else(
                        || format!("backend reported failure for step '{}'", step.id),
                    )))
                };
            }
        }
    }
}

/// Service delegate that asks the training backend to manage the MCP server
/// process on our behalf.
pub struct HttpServiceDelegate {
    client: Client,
    base_url: String,
}

impl HttpServiceDelegate {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post_expecting_ok(&self, path: &str, body: Option<&ServiceConfig>) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.post(&url);
        let request = match body {
            Some(config) => request.json(config),
            None => request,
        };
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EngineError::DelegateFailure(format!(
                "backend returned {} for {}",
                response.status(),
                path
            )))
        }
    }
}

#[async_trait]
impl ServiceDelegate for HttpServiceDelegate {
    async fn start(&self, config: &ServiceConfig) -> Result<()> {
        self.post_expecting_ok("/mcp/start", Some(config)).await
    }

    async fn stop(&self) -> Result<()> {
        self.post_expecting_ok("/mcp/stop", None).await
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/mcp/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EngineError::DelegateFailure(format!(
                "health check returned {}",
                response.status()
            )))
        }
    }
}
