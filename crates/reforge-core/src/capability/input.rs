//! The input handed to a capability provider for one task.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use reforge_types::plan::PlanStep;
use reforge_types::task::TaskResult;

use crate::graph::context::{lookup_step_reference, value_to_text};

/// What the provider is asked to do, with templates already resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskRequest {
    Reasoning {
        instruction: String,
    },
    Tool {
        operation: String,
        args: BTreeMap<String, Value>,
    },
    HumanGate {
        prompt: String,
    },
}

/// Everything a provider sees when executing a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInput {
    pub task_id: String,
    /// The plan step this graph run belongs to.
    pub step: PlanStep,
    /// Feedback from the previous attempt of the step, if any.
    pub feedback: Option<String>,
    /// The step's working copy; tools run here.
    pub working_dir: PathBuf,
    pub request: TaskRequest,
    /// Resolved named inputs. `result_of` bindings carry the full upstream result.
    pub inputs: BTreeMap<String, Value>,
    /// Results of every upstream task, verbatim.
    pub upstream: BTreeMap<String, TaskResult>,
}

impl TaskInput {
    /// Resolve a template reference against this input.
    ///
    /// Understands the step references (`step.id`, `feedback`, ...), plus
    /// `args.<key>` for tool requests, `inputs.<name>` and
    /// `tasks.<id>.raw_text` for upstream tasks.
    pub fn lookup(&self, expr: &str) -> Option<String> {
        if let Some(found) =
            lookup_step_reference(expr, &self.step, self.feedback.as_deref(), &self.working_dir)
        {
            return Some(found);
        }
        if expr == "task_id" {
            return Some(self.task_id.clone());
        }
        if let Some(key) = expr.strip_prefix("args.") {
            return match &self.request {
                TaskRequest::Tool { args, .. } => args.get(key).map(value_to_text),
                _ => None,
            };
        }
        if let Some(name) = expr.strip_prefix("inputs.") {
            return self.inputs.get(name).map(value_to_text);
        }
        let (task, field) = expr.strip_prefix("tasks.")?.rsplit_once('.')?;
        let result = self.upstream.get(task)?;
        match field {
            "raw_text" => Some(result.raw_text.clone()),
            "payload" => Some(result.payload.to_string()),
            _ => None,
        }
    }
}
