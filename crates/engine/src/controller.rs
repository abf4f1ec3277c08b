use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    delegates::{ServiceDelegate, StepDelegate},
    logs::{LogEntry, LogFilter, LogLevel, LogStore},
    metrics,
    pipeline::{PipelineGraph, PipelineStep, StepStatus},
    service::{ServiceConfig, ServiceConnectionState},
    store::{PersistedState, PersistedStep, StateStore},
    tasks::{Task, TaskRegistry, TaskStatus, TaskUpdate},
    EngineError, Result,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Pushed to subscribers on every observable mutation so UI surfaces never
/// have to poll.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    StepUpdated { id: String, status: StepStatus },
    CursorMoved { index: usize },
    TaskAdded { id: String },
    TaskUpdated { id: String },
    TaskRemoved { id: String },
    LogAppended { id: u64 },
    LogsCleared,
    ServiceUpdated,
}

/// Read-only view of the step list plus the wizard cursor.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub cursor: usize,
    pub steps: Vec<PipelineStep>,
}

struct Inflight {
    task_id: String,
    /// Distinguishes this execution from any later one for the same step so
    /// stale delegate results can be discarded after cancellation.
    generation: Uuid,
    cancel: oneshot::Sender<()>,
}

/// The one component that sequences the graph, the task registry, the log
/// store, and the service state. All mutation goes through here; everything
/// else observes through snapshots and the event stream.
pub struct WorkflowController {
    graph: RwLock<PipelineGraph>,
    tasks: RwLock<TaskRegistry>,
    logs: RwLock<LogStore>,
    service: RwLock<ServiceConnectionState>,
    store: Arc<dyn StateStore>,
    step_delegate: Arc<dyn StepDelegate>,
    service_delegate: Arc<dyn ServiceDelegate>,
    inflight: Mutex<HashMap<String, Inflight>>,
    events: broadcast::Sender<ChangeEvent>,
}

impl WorkflowController {
    /// Builds the controller from the static topology, reconciled against
    /// whatever the store has. Malformed persisted state falls back to the
    /// defaults rather than leaving the graph half-applied.
    pub async fn load(
        store: Arc<dyn StateStore>,
        step_delegate: Arc<dyn StepDelegate>,
        service_delegate: Arc<dyn ServiceDelegate>,
        log_capacity: usize,
    ) -> Arc<Self> {
        let mut graph = PipelineGraph::with_default_topology();
        let mut service_config = ServiceConfig::default();

        match store.load_state().await {
            Ok(Some(state)) => {
                graph.reconcile(&state.steps);
                let cursor = state.cursor.min(graph.len() - 1);
                // static topology guarantees the clamped index exists
                let _ = graph.set_cursor(cursor);
                service_config = state.service;
                info!("restored persisted pipeline state (cursor = {})", cursor);
            }
            Ok(None) => info!("no persisted state, starting from the default topology"),
            Err(e) => warn!("discarding malformed persisted state: {}", e),
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            graph: RwLock::new(graph),
            tasks: RwLock::new(TaskRegistry::new()),
            logs: RwLock::new(LogStore::new(log_capacity)),
            service: RwLock::new(ServiceConnectionState::new(service_config)),
            store,
            step_delegate,
            service_delegate,
            inflight: Mutex::new(HashMap::new()),
            events,
        })
    }

    // ---- step execution ----------------------------------------------------

    /// Starts one execution attempt for `step_id` and returns the task id.
    ///
    /// At most one execution per step may be in flight; rejections leave the
    /// graph and the registry untouched.
    pub async fn execute_step(self: &Arc<Self>, step_id: &str) -> Result<String> {
        let mut inflight = self.inflight.lock().await;
        if inflight.contains_key(step_id) {
            self.log_event(LogLevel::Error, step_id, "execution rejected: step is already running")
                .await;
            return Err(EngineError::AlreadyRunning(step_id.to_string()));
        }

        let step = {
            let graph = self.graph.read().await;
            let Some(step) = graph.get(step_id) else {
                debug!("execution requested for unknown step '{}'", step_id);
                self.log_event(LogLevel::Debug, step_id, "execution requested for unknown step")
                    .await;
                return Err(EngineError::NotFound(format!("step '{}'", step_id)));
            };
            if !graph.is_executable(step_id) {
                self.log_event(
                    LogLevel::Error,
                    step_id,
                    "execution rejected: dependencies not satisfied",
                )
                .await;
                return Err(EngineError::DependencyNotSatisfied(step_id.to_string()));
            }
            step.clone()
        };

        let task = Task::for_step(&step);
        let task_id = task.id.clone();
        if let Err(e) = self.tasks.write().await.add(task) {
            debug!("task registration conflict for step '{}': {}", step_id, e);
            self.log_event(LogLevel::Debug, step_id, format!("task registration conflict: {}", e))
                .await;
            return Err(e);
        }

        {
            let mut graph = self.graph.write().await;
            // step existence was checked above
            let _ = graph.set_status(step_id, StepStatus::Running);
        }
        metrics::STEP_EXECUTIONS_TOTAL.inc();
        self.emit(ChangeEvent::StepUpdated {
            id: step_id.to_string(),
            status: StepStatus::Running,
        });
        self.emit(ChangeEvent::TaskAdded { id: task_id.clone() });
        self.persist().await;
        self.log_event(LogLevel::Info, step_id, format!("step '{}' started", step.title))
            .await;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let generation = Uuid::new_v4();
        inflight.insert(
            step_id.to_string(),
            Inflight {
                task_id: task_id.clone(),
                generation,
                cancel: cancel_tx,
            },
        );
        drop(inflight);

        let controller = Arc::clone(self);
        let driver_task_id = task_id.clone();
        tokio::spawn(async move {
            controller.drive(step, driver_task_id, generation, cancel_rx).await;
        });

        Ok(task_id)
    }

    /// Runs the delegate, forwarding progress into the registry, and
    /// publishes the terminal outcome unless this execution was cancelled in
    /// the meantime.
    async fn drive(
        self: Arc<Self>,
        step: PipelineStep,
        task_id: String,
        generation: Uuid,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let (progress_tx, mut progress_rx) = mpsc::channel(32);
        let delegate = Arc::clone(&self.step_delegate);
        let delegate_step = step.clone();
        let mut work =
            tokio::spawn(async move { delegate.run(&delegate_step, progress_tx).await });

        let mut progress_open = true;
        let outcome: Result<()> = loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    // cancel_step already published the error state; stop the
                    // delegate and make sure nothing of it reaches the stores
                    work.abort();
                    debug!("execution of step '{}' cancelled, discarding delegate output", step.id);
                    return;
                }
                result = &mut work => {
                    break match result {
                        Ok(outcome) => outcome,
                        Err(e) => Err(EngineError::Internal(format!(
                            "execution task for step '{}' panicked: {}",
                            step.id, e
                        ))),
                    };
                }
                report = progress_rx.recv(), if progress_open => {
                    match report {
                        Some(pct) => {
                            let update = TaskUpdate {
                                progress: Some(pct),
                                ..Default::default()
                            };
                            if self.tasks.write().await.update(&task_id, update).is_ok() {
                                self.emit(ChangeEvent::TaskUpdated { id: task_id.clone() });
                            }
                        }
                        None => progress_open = false,
                    }
                }
            }
        };

        // Only the generation that still owns the in-flight slot may publish;
        // a result arriving after cancellation is stale.
        {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(&step.id) {
                Some(entry) if entry.generation == generation => {
                    inflight.remove(&step.id);
                }
                _ => {
                    debug!("dropping stale delegate result for step '{}'", step.id);
                    return;
                }
            }
        }

        match outcome {
            Ok(()) => self.finish_success(&step, &task_id).await,
            Err(e) => self.finish_failure(&step, &task_id, e).await,
        }
    }

    async fn finish_success(&self, step: &PipelineStep, task_id: &str) {
        let (advanced_to, unblocked) = {
            let mut graph = self.graph.write().await;
            let _ = graph.set_status(&step.id, StepStatus::Completed);
            let unblocked = graph.newly_unblocked(&step.id);
            let advanced_to = if graph.cursor_step().id == step.id {
                graph.advance();
                Some(graph.cursor())
            } else {
                None
            };
            (advanced_to, unblocked)
        };

        let update = TaskUpdate {
            status: Some(TaskStatus::Success),
            progress: Some(100),
        };
        let _ = self.tasks.write().await.update(task_id, update);

        self.emit(ChangeEvent::StepUpdated {
            id: step.id.clone(),
            status: StepStatus::Completed,
        });
        self.emit(ChangeEvent::TaskUpdated { id: task_id.to_string() });
        if let Some(index) = advanced_to {
            self.emit(ChangeEvent::CursorMoved { index });
        }
        self.persist().await;
        self.log_event(LogLevel::Info, &step.id, format!("step '{}' completed", step.title))
            .await;
        if !unblocked.is_empty() {
            self.log_event(
                LogLevel::Info,
                &step.id,
                format!("completion unblocked: {}", unblocked.join(", ")),
            )
            .await;
        }
    }

    async fn finish_failure(&self, step: &PipelineStep, task_id: &str, err: EngineError) {
        metrics::STEP_FAILURES_TOTAL.inc();
        {
            let mut graph = self.graph.write().await;
            let _ = graph.set_status(&step.id, StepStatus::Error);
        }
        let update = TaskUpdate {
            status: Some(TaskStatus::Error),
            ..Default::default()
        };
        let _ = self.tasks.write().await.update(task_id, update);

        self.emit(ChangeEvent::StepUpdated {
            id: step.id.clone(),
            status: StepStatus::Error,
        });
        self.emit(ChangeEvent::TaskUpdated { id: task_id.to_string() });
        self.persist().await;
        self.log_event(
            LogLevel::Error,
            &step.id,
            format!("step '{}' failed: {}", step.title, err),
        )
        .await;
    }

    /// Stops a running execution: the step and its task move to `Error`, the
    /// per-step lock is released, and anything the delegate still reports is
    /// suppressed.
    pub async fn cancel_step(&self, step_id: &str) -> Result<()> {
        let entry = self.inflight.lock().await.remove(step_id);
        let Some(entry) = entry else {
            debug!("cancel requested for step '{}' with no execution in flight", step_id);
            self.log_event(LogLevel::Debug, step_id, "cancel requested but nothing is running")
                .await;
            return Err(EngineError::NotFound(format!(
                "no running execution for step '{}'",
                step_id
            )));
        };
        // the driver exits on this signal (or on the sender drop below)
        let _ = entry.cancel.send(());
        metrics::STEP_CANCELLATIONS_TOTAL.inc();

        {
            let mut graph = self.graph.write().await;
            let _ = graph.set_status(step_id, StepStatus::Error);
        }
        let update = TaskUpdate {
            status: Some(TaskStatus::Error),
            ..Default::default()
        };
        let _ = self.tasks.write().await.update(&entry.task_id, update);

        self.emit(ChangeEvent::StepUpdated {
            id: step_id.to_string(),
            status: StepStatus::Error,
        });
        self.emit(ChangeEvent::TaskUpdated { id: entry.task_id.clone() });
        self.persist().await;
        let reason = EngineError::Cancelled(step_id.to_string());
        self.log_event(LogLevel::Error, step_id, reason.to_string()).await;
        Ok(())
    }

    // ---- operator overrides ------------------------------------------------

    /// Manual status override, bypassing the state machine. Still routed
    /// through the controller so it persists and notifies like any mutation.
    pub async fn override_step_status(&self, step_id: &str, status: StepStatus) -> Result<()> {
        {
            let mut graph = self.graph.write().await;
            if let Err(e) = graph.set_status(step_id, status) {
                debug!("status override for unknown step '{}'", step_id);
                drop(graph);
                self.log_event(LogLevel::Debug, step_id, "status override for unknown step")
                    .await;
                return Err(e);
            }
        }
        self.emit(ChangeEvent::StepUpdated {
            id: step_id.to_string(),
            status,
        });
        self.persist().await;
        self.log_event(
            LogLevel::Info,
            step_id,
            format!("status manually set to '{}'", status),
        )
        .await;
        Ok(())
    }

    pub async fn set_cursor(&self, index: usize) -> Result<()> {
        self.graph.write().await.set_cursor(index)?;
        self.emit(ChangeEvent::CursorMoved { index });
        self.persist().await;
        Ok(())
    }

    pub async fn remove_task(&self, task_id: &str) {
        self.tasks.write().await.remove(task_id);
        self.emit(ChangeEvent::TaskRemoved { id: task_id.to_string() });
    }

    /// Ingests a log entry from an outside source (UI pages, proxied backend
    /// output).
    pub async fn append_log(
        &self,
        level: LogLevel,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> u64 {
        self.log_event(level, &source.into(), message).await
    }

    pub async fn clear_logs(&self) {
        self.logs.write().await.clear();
        self.emit(ChangeEvent::LogsCleared);
    }

    // ---- service lifecycle -------------------------------------------------

    pub async fn start_service(&self, config: ServiceConfig) -> Result<()> {
        self.log_event(
            LogLevel::Info,
            "mcp-server",
            format!("starting MCP server '{}' on port {}", config.server_path, config.port),
        )
        .await;
        match self.service_delegate.start(&config).await {
            Ok(()) => {
                self.service.write().await.record_started(config);
                self.emit(ChangeEvent::ServiceUpdated);
                self.persist().await;
                self.log_event(LogLevel::Info, "mcp-server", "MCP server started").await;
                Ok(())
            }
            Err(e) => {
                self.log_event(
                    LogLevel::Error,
                    "mcp-server",
                    format!("failed to start MCP server: {}", e),
                )
                .await;
                Err(e)
            }
        }
    }

    pub async fn stop_service(&self) -> Result<()> {
        match self.service_delegate.stop().await {
            Ok(()) => {
                self.service.write().await.record_stopped();
                self.emit(ChangeEvent::ServiceUpdated);
                self.log_event(LogLevel::Info, "mcp-server", "MCP server stopped").await;
                Ok(())
            }
            Err(e) => {
                self.log_event(
                    LogLevel::Error,
                    "mcp-server",
                    format!("failed to stop MCP server: {}", e),
                )
                .await;
                Err(e)
            }
        }
    }

    /// A failed check reports through the log/error channel only; the last
    /// successful timestamp stays as it was.
    pub async fn check_service(&self) -> Result<()> {
        match self.service_delegate.health_check().await {
            Ok(()) => {
                self.service.write().await.record_health_check();
                self.emit(ChangeEvent::ServiceUpdated);
                self.log_event(LogLevel::Info, "mcp-server", "health check succeeded").await;
                Ok(())
            }
            Err(e) => {
                self.log_event(
                    LogLevel::Error,
                    "mcp-server",
                    format!("health check failed: {}", e),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Operator edit of the launch configuration without touching the
    /// process.
    pub async fn update_service_config(&self, config: ServiceConfig) {
        self.service.write().await.set_config(config);
        self.emit(ChangeEvent::ServiceUpdated);
        self.persist().await;
        self.log_event(LogLevel::Info, "mcp-server", "configuration updated").await;
    }

    // ---- observation surface -----------------------------------------------

    pub async fn pipeline_snapshot(&self) -> PipelineSnapshot {
        let graph = self.graph.read().await;
        PipelineSnapshot {
            cursor: graph.cursor(),
            steps: graph.steps().to_vec(),
        }
    }

    pub async fn tasks_snapshot(&self) -> Vec<Task> {
        self.tasks.read().await.tasks().to_vec()
    }

    pub async fn logs(&self, filter: &LogFilter) -> Vec<LogEntry> {
        self.logs
            .read()
            .await
            .query(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn export_logs(&self, filter: &LogFilter) -> String {
        self.logs.read().await.export(filter)
    }

    pub async fn service_snapshot(&self) -> ServiceConnectionState {
        self.service.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    // ---- internals ---------------------------------------------------------

    fn emit(&self, event: ChangeEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn log_event(
        &self,
        level: LogLevel,
        source: &str,
        message: impl Into<String>,
    ) -> u64 {
        let id = self.logs.write().await.append(level, source, message);
        metrics::LOG_ENTRIES_TOTAL.inc();
        self.emit(ChangeEvent::LogAppended { id });
        id
    }

    /// Write-through persistence of the durable fields. Failures are logged
    /// and the in-memory state stays authoritative for the session.
    async fn persist(&self) {
        let state = {
            let graph = self.graph.read().await;
            let service = self.service.read().await;
            PersistedState {
                cursor: graph.cursor(),
                steps: graph
                    .steps()
                    .iter()
                    .map(|s| PersistedStep {
                        id: s.id.clone(),
                        status: s.status,
                    })
                    .collect(),
                service: service.config.clone(),
            }
        };
        if let Err(e) = self.store.save_state(&state).await {
            error!("failed to persist engine state: {}", e);
        }
    }
}
