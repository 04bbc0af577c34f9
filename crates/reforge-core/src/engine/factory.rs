//! Task graph construction per plan step.

use reforge_types::plan::PlanStep;

use crate::graph::{GraphError, TaskGraph};

/// Builds the task graph the engine runs for a plan step.
pub trait GraphFactory: Send + Sync {
    fn build(&self, step: &PlanStep) -> Result<TaskGraph, GraphError>;
}

impl<F> GraphFactory for F
where
    F: Fn(&PlanStep) -> Result<TaskGraph, GraphError> + Send + Sync,
{
    fn build(&self, step: &PlanStep) -> Result<TaskGraph, GraphError> {
        self(step)
    }
}
