use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::logs::DEFAULT_LOG_CAPACITY;
use crate::store::DatabaseConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logs: LogConfig,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub capacity: usize,
}

/// Where the training backend (execution + service delegates) listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Config {
            server: ServerConfig {
                addr: std::env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            },
            database: DatabaseConfig {
                sqlite_path: std::env::var("SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("data/easytrain.db")),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            logs: LogConfig {
                capacity: std::env::var("LOG_CAPACITY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LOG_CAPACITY),
            },
            backend: BackendConfig {
                base_url: std::env::var("BACKEND_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:9090".to_string()),
            },
        };

        if config.logs.capacity == 0 {
            return Err(crate::EngineError::Config(
                "LOG_CAPACITY must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "0.0.0.0:3000".to_string(),
            },
            database: DatabaseConfig::default(),
            logs: LogConfig {
                capacity: DEFAULT_LOG_CAPACITY,
            },
            backend: BackendConfig {
                base_url: "http://127.0.0.1:9090".to_string(),
            },
        }
    }
}
