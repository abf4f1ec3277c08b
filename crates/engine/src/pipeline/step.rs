use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::EngineError;

/// Lifecycle of a pipeline step. `Error` is not terminal: a failed step may
/// be re-executed, which moves it back through `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for StepStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "error" => Ok(StepStatus::Error),
            other => Err(EngineError::Config(format!(
                "invalid step status '{}'",
                other
            ))),
        }
    }
}

/// One stage of the training pipeline. The topology (ids, titles,
/// dependencies) is static; `status` is the only field that ever changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl PipelineStep {
    pub fn new(id: &str, title: &str, description: &str, dependencies: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            status: StepStatus::Pending,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            StepStatus::Pending,
            StepStatus::Running,
            StepStatus::Completed,
            StepStatus::Error,
        ] {
            assert_eq!(status.to_string().parse::<StepStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        assert!("in-progress".parse::<StepStatus>().is_err());
        assert!("failed".parse::<StepStatus>().is_err());
    }
}
