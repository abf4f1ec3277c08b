use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{pipeline::PipelineStep, EngineError, Result};

/// Task-local status vocabulary, distinct from [`crate::pipeline::StepStatus`]:
/// a finished attempt is `Success`, not `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One concrete execution attempt of a pipeline step. Multiple tasks may
/// reference the same step over time; the registry never ties them back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Builds the execution record for a step that is about to run. The id is
    /// derived from the step id and the creation timestamp.
    pub fn for_step(step: &PipelineStep) -> Self {
        let created_at = Utc::now();
        Self {
            id: format!("{}-{}", step.id, created_at.timestamp_millis()),
            title: step.title.clone(),
            description: step.description.clone(),
            status: TaskStatus::Running,
            progress: 0,
            created_at,
        }
    }
}

/// Partial update merged into an existing task.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
}

/// In-memory bookkeeping for in-flight and finished executions. Session
/// scoped: never persisted, entries removed only on operator request.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, task: Task) -> Result<()> {
        if self.tasks.iter().any(|t| t.id == task.id) {
            return Err(EngineError::Conflict(format!(
                "task '{}' is already registered",
                task.id
            )));
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Merges `update` into the task. Progress is clamped to 100 and never
    /// moves backwards.
    pub fn update(&mut self, task_id: &str, update: TaskUpdate) -> Result<()> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| EngineError::NotFound(format!("task '{}'", task_id)))?;
        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(progress) = update.progress {
            task.progress = task.progress.max(progress.min(100));
        }
        Ok(())
    }

    /// Idempotent: removing an unknown id is a no-op.
    pub fn remove(&mut self, task_id: &str) {
        self.tasks.retain(|t| t.id != task_id);
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: "Test".to_string(),
            description: String::new(),
            status: TaskStatus::Running,
            progress: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn add_rejects_duplicate_ids() {
        let mut registry = TaskRegistry::new();
        registry.add(task("t1")).unwrap();
        assert!(matches!(
            registry.add(task("t1")),
            Err(EngineError::Conflict(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn update_unknown_id_reports_not_found() {
        let mut registry = TaskRegistry::new();
        assert!(matches!(
            registry.update("missing", TaskUpdate::default()),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn update_merges_fields() {
        let mut registry = TaskRegistry::new();
        registry.add(task("t1")).unwrap();
        registry
            .update(
                "t1",
                TaskUpdate {
                    status: Some(TaskStatus::Success),
                    progress: Some(100),
                },
            )
            .unwrap();
        let t = registry.get("t1").unwrap();
        assert_eq!(t.status, TaskStatus::Success);
        assert_eq!(t.progress, 100);
    }

    #[test]
    fn progress_is_monotone_and_clamped() {
        let mut registry = TaskRegistry::new();
        registry.add(task("t1")).unwrap();
        let set = |r: &mut TaskRegistry, p: u8| {
            r.update(
                "t1",
                TaskUpdate {
                    progress: Some(p),
                    ..Default::default()
                },
            )
            .unwrap()
        };
        set(&mut registry, 40);
        set(&mut registry, 20);
        assert_eq!(registry.get("t1").unwrap().progress, 40);
        set(&mut registry, 120);
        assert_eq!(registry.get("t1").unwrap().progress, 100);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = TaskRegistry::new();
        registry.add(task("t1")).unwrap();
        registry.remove("t1");
        registry.remove("t1");
        assert!(registry.is_empty());
    }

    #[test]
    fn for_step_copies_display_text() {
        let step = PipelineStep::new("setup", "MCP Configuration", "Configure it", &[]);
        let task = Task::for_step(&step);
        assert!(task.id.starts_with("setup-"));
        assert_eq!(task.title, "MCP Configuration");
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.progress, 0);
    }
}
