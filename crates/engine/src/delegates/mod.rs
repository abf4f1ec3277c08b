mod http;

pub use http::{HttpServiceDelegate, HttpStepDelegate};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{pipeline::PipelineStep, service::ServiceConfig, Result};

/// Progress reports are integer percentages in `0..=100`.
pub type ProgressSender = mpsc::Sender<u8>;

/// Performs the real work behind a pipeline step (data generation, training,
/// deployment). Implementations stream progress through `progress` and
/// resolve with the terminal outcome; a dropped receiver means the controller
/// no longer cares and reports may stop.
#[async_trait]
pub trait StepDelegate: Send + Sync {
    async fn run(&self, step: &PipelineStep, progress: ProgressSender) -> Result<()>;
}

/// Controls the externally managed MCP server process. The engine only
/// records outcomes; process management stays on the other side of this
/// trait.
#[async_trait]
pub trait ServiceDelegate: Send + Sync {
    async fn start(&self, config: &ServiceConfig) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn health_check(&self) -> Result<()>;
}
