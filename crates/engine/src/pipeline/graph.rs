use std::collections::{HashMap, VecDeque};

use crate::{store::PersistedStep, EngineError, Result};

use super::step::{PipelineStep, StepStatus};

/// The ordered set of pipeline steps plus the wizard navigation cursor.
///
/// Gating queries are answered against a reverse-dependency index computed
/// once at construction; the topology never changes after that.
pub struct PipelineGraph {
    steps: Vec<PipelineStep>,
    index: HashMap<String, usize>,
    dependents: HashMap<String, Vec<String>>,
    cursor: usize,
}

impl PipelineGraph {
    pub fn new(steps: Vec<PipelineStep>) -> Result<Self> {
        if steps.is_empty() {
            return Err(EngineError::Config(
                "pipeline topology must contain at least one step".to_string(),
            ));
        }

        let mut index = HashMap::new();
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.id.clone(), i).is_some() {
                return Err(EngineError::Config(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for step in &steps {
            for dep in &step.dependencies {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(step.id.clone());
            }
        }

        check_acyclic(&steps, &index, &dependents)?;

        Ok(Self {
            steps,
            index,
            dependents,
            cursor: 0,
        })
    }

    /// The canonical training pipeline. The static topology is validated by
    /// tests, so construction cannot fail here.
    pub fn with_default_topology() -> Self {
        Self::new(default_topology()).expect("default topology is a valid DAG")
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, step_id: &str) -> Option<&PipelineStep> {
        self.index.get(step_id).map(|&i| &self.steps[i])
    }

    /// True iff every declared dependency names an existing step whose status
    /// is `Completed`. Unknown step ids and unknown dependency ids both fail
    /// closed.
    pub fn is_executable(&self, step_id: &str) -> bool {
        let Some(&i) = self.index.get(step_id) else {
            return false;
        };
        self.steps[i].dependencies.iter().all(|dep| {
            self.index
                .get(dep)
                .map(|&j| self.steps[j].status == StepStatus::Completed)
                .unwrap_or(false)
        })
    }

    /// Replaces the step's status, returning the previous one.
    pub fn set_status(&mut self, step_id: &str, status: StepStatus) -> Result<StepStatus> {
        let &i = self
            .index
            .get(step_id)
            .ok_or_else(|| EngineError::NotFound(format!("step '{}'", step_id)))?;
        let old = self.steps[i].status;
        self.steps[i].status = status;
        Ok(old)
    }

    /// Steps that declare `step_id` as a dependency.
    pub fn dependents_of(&self, step_id: &str) -> &[String] {
        self.dependents
            .get(step_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Dependents of `step_id` that are now executable and still waiting to
    /// run. Meaningful right after `step_id` completes.
    pub fn newly_unblocked(&self, step_id: &str) -> Vec<String> {
        self.dependents_of(step_id)
            .iter()
            .filter(|id| {
                self.is_executable(id)
                    && self
                        .get(id)
                        .map(|s| matches!(s.status, StepStatus::Pending | StepStatus::Error))
                        .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cursor_step(&self) -> &PipelineStep {
        &self.steps[self.cursor]
    }

    /// Wizard navigation is independent of gating: the operator may focus a
    /// locked step, they just cannot execute it.
    pub fn set_cursor(&mut self, index: usize) -> Result<()> {
        if index >= self.steps.len() {
            return Err(EngineError::NotFound(format!("step index {}", index)));
        }
        self.cursor = index;
        Ok(())
    }

    /// Moves the cursor to the next step, saturating at the last one.
    pub fn advance(&mut self) {
        if self.cursor + 1 < self.steps.len() {
            self.cursor += 1;
        }
    }

    /// Applies persisted `{id, status}` pairs onto the static topology.
    /// Persisted ids that no longer exist are dropped; static steps missing
    /// from the snapshot keep their default `Pending` status.
    pub fn reconcile(&mut self, persisted: &[PersistedStep]) {
        for entry in persisted {
            if let Some(&i) = self.index.get(&entry.id) {
                self.steps[i].status = entry.status;
            }
        }
    }
}

/// Kahn's algorithm over the known-id edges. Dependencies naming unknown
/// steps cannot form a cycle; they simply gate forever.
fn check_acyclic(
    steps: &[PipelineStep],
    index: &HashMap<String, usize>,
    dependents: &HashMap<String, Vec<String>>,
) -> Result<()> {
    let mut indegree = vec![0usize; steps.len()];
    for (i, step) in steps.iter().enumerate() {
        indegree[i] = step
            .dependencies
            .iter()
            .filter(|d| index.contains_key(*d))
            .count();
    }

    let mut queue: VecDeque<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut visited = 0usize;
    while let Some(i) = queue.pop_front() {
        visited += 1;
        if let Some(deps) = dependents.get(&steps[i].id) {
            for id in deps {
                let j = index[id];
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    queue.push_back(j);
                }
            }
        }
    }

    if visited != steps.len() {
        let stuck = steps
            .iter()
            .enumerate()
            .find(|(i, _)| indegree[*i] > 0)
            .map(|(_, s)| s.id.clone())
            .unwrap_or_default();
        return Err(EngineError::Config(format!(
            "dependency cycle involving step '{}'",
            stuck
        )));
    }
    Ok(())
}

/// The eleven stages of the training workflow, in wizard order. Each stage
/// depends on the previous one.
pub fn default_topology() -> Vec<PipelineStep> {
    vec![
        PipelineStep::new("setup", "MCP Configuration", "Configure the MCP server connection", &[]),
        PipelineStep::new("questions", "Question Generation", "Generate training question data", &["setup"]),
        PipelineStep::new("sft-data", "SFT Data", "Generate supervised fine-tuning data", &["questions"]),
        PipelineStep::new("data-labeling", "Data Labeling", "Review and label the generated data", &["sft-data"]),
        PipelineStep::new("sft-train", "SFT Training", "Run supervised fine-tuning", &["data-labeling"]),
        PipelineStep::new("sft-eval", "SFT Evaluation", "Evaluate the fine-tuned model", &["sft-train"]),
        PipelineStep::new("rl-data", "RL Data Preparation", "Prepare reinforcement learning data", &["sft-eval"]),
        PipelineStep::new("rl-train", "RL Training", "Run reinforcement learning training", &["rl-data"]),
        PipelineStep::new("rl-eval", "RL Evaluation", "Evaluate the RL-trained model", &["rl-train"]),
        PipelineStep::new("deploy", "Model Deployment", "Deploy the trained model", &["rl-eval"]),
        PipelineStep::new("test", "Online Test", "Exercise the deployed model service", &["deploy"]),
    ]
}
