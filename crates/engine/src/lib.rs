pub mod config;
pub mod controller;
pub mod delegates;
pub mod logs;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod store;
pub mod tasks;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("dependencies not satisfied for step '{0}'")]
    DependencyNotSatisfied(String),
    #[error("step '{0}' already has an execution in flight")]
    AlreadyRunning(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("delegate failure: {0}")]
    DelegateFailure(String),
    #[error("execution of step '{0}' was cancelled")]
    Cancelled(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
