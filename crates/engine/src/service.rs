use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Launch configuration for the externally managed MCP server. Persisted;
/// editable by the operator outside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub server_path: String,
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server_path: "/path/to/mcp/server".to_string(),
            port: 8080,
        }
    }
}

/// Observed lifecycle of the MCP server. This records outcomes only; the
/// actual start/stop/health RPCs live in the service delegate.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceConnectionState {
    pub config: ServiceConfig,
    pub is_running: bool,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl ServiceConnectionState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            is_running: false,
            last_health_check: None,
        }
    }

    pub fn record_started(&mut self, config: ServiceConfig) {
        self.config = config;
        self.is_running = true;
        self.last_health_check = Some(Utc::now());
    }

    /// Leaves `last_health_check` untouched so the last successful check
    /// stays historically visible.
    pub fn record_stopped(&mut self) {
        self.is_running = false;
    }

    pub fn record_health_check(&mut self) {
        self.last_health_check = Some(Utc::now());
    }

    pub fn set_config(&mut self, config: ServiceConfig) {
        self.config = config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_records_config_and_stamps_health() {
        let mut state = ServiceConnectionState::new(ServiceConfig::default());
        assert!(!state.is_running);
        assert!(state.last_health_check.is_none());

        let config = ServiceConfig {
            server_path: "/opt/mcp".to_string(),
            port: 9000,
        };
        state.record_started(config.clone());
        assert!(state.is_running);
        assert_eq!(state.config, config);
        assert!(state.last_health_check.is_some());
    }

    #[test]
    fn stop_preserves_last_health_check() {
        let mut state = ServiceConnectionState::new(ServiceConfig::default());
        state.record_started(ServiceConfig::default());
        let stamped = state.last_health_check;

        state.record_stopped();
        assert!(!state.is_running);
        assert_eq!(state.last_health_check, stamped);
    }

    #[test]
    fn health_check_updates_the_timestamp() {
        let mut state = ServiceConnectionState::new(ServiceConfig::default());
        state.record_health_check();
        let first = state.last_health_check.unwrap();
        state.record_health_check();
        assert!(state.last_health_check.unwrap() >= first);
    }
}
