mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::{pipeline::StepStatus, service::ServiceConfig, Result};

/// Mutable step state as persisted: topology, titles, and descriptions are
/// redefined from code at load, so only `{id, status}` is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStep {
    pub id: String,
    pub status: StepStatus,
}

/// Durable snapshot of the engine. Logs and tasks are session scoped and
/// deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub cursor: usize,
    pub steps: Vec<PersistedStep>,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub sqlite_path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/easytrain.db"),
            max_connections: 5,
        }
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Initialize the schema.
    async fn init(&self) -> Result<()>;

    /// Load the last written snapshot; `None` on first run.
    async fn load_state(&self) -> Result<Option<PersistedState>>;

    /// Replace the stored snapshot.
    async fn save_state(&self, state: &PersistedState) -> Result<()>;
}

pub async fn create_store(config: &DatabaseConfig) -> Result<Arc<dyn StateStore>> {
    Ok(Arc::new(SqliteStore::new(config).await?))
}
