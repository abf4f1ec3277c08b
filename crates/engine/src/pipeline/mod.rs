mod graph;
mod step;

pub use graph::{default_topology, PipelineGraph};
pub use step::{PipelineStep, StepStatus};
