//! Worker: runs one task node on one capability provider.
//!
//! The worker resolves the node's templates and input bindings into a
//! `TaskInput`, invokes the provider, and folds a `CapabilityError` into an
//! error `TaskResult`. It never retries.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::Instrument;

use reforge_types::task::{InputBinding, TaskKind, TaskNode, TaskResult};

use crate::capability::{BoxCapabilityProvider, TaskInput, TaskRequest};

use super::context::{GraphContext, ResultStore};

/// A task bound to the provider that will execute it.
#[derive(Debug, Clone)]
pub struct Worker {
    task_id: String,
    provider: BoxCapabilityProvider,
}

/// What a worker produced, with its wall-clock duration.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub task_id: String,
    pub result: TaskResult,
    pub elapsed: Duration,
}

impl Worker {
    pub fn new(task_id: impl Into<String>, provider: BoxCapabilityProvider) -> Self {
        Self {
            task_id: task_id.into(),
            provider,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Execute the task. Always yields a result; provider errors become error results.
    pub async fn execute(self, input: TaskInput) -> WorkerReport {
        let span = tracing::info_span!(
            "task",
            task_id = %self.task_id,
            provider = %self.provider.name(),
        );

        let start = Instant::now();
        let result = match self.provider.invoke(&input).instrument(span.clone()).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    task_id = %self.task_id,
                    provider = %self.provider.name(),
                    error = %e,
                    "capability invocation failed"
                );
                TaskResult::error(e.to_string())
            }
        };
        let elapsed = start.elapsed();

        span.in_scope(|| {
            tracing::info!(
                status = ?result.status,
                duration_ms = elapsed.as_millis() as u64,
                "task finished"
            )
        });

        WorkerReport {
            task_id: self.task_id,
            result,
            elapsed,
        }
    }
}

/// Build the provider input for `node` from the context and recorded results.
pub fn prepare_input(
    node: &TaskNode,
    upstream_ids: &[&str],
    ctx: &GraphContext,
    results: &ResultStore,
) -> TaskInput {
    let request = match &node.kind {
        TaskKind::Reasoning { instruction, .. } => TaskRequest::Reasoning {
            instruction: ctx.resolve_template(instruction, results),
        },
        TaskKind::Tool {
            operation, args, ..
        } => TaskRequest::Tool {
            operation: operation.clone(),
            args: args
                .iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, ctx, results)))
                .collect(),
        },
        TaskKind::HumanGate { prompt, .. } => TaskRequest::HumanGate {
            prompt: ctx.resolve_template(prompt, results),
        },
    };

    let inputs: BTreeMap<String, Value> = node
        .inputs
        .iter()
        .map(|(name, binding)| {
            let value = match binding {
                InputBinding::Literal { value } => resolve_value(value, ctx, results),
                InputBinding::ResultOf { task } => results
                    .get(task)
                    .and_then(|r| serde_json::to_value(r).ok())
                    .unwrap_or(Value::Null),
            };
            (name.clone(), value)
        })
        .collect();

    let upstream = upstream_ids
        .iter()
        .filter_map(|id| results.get(id).map(|r| (id.to_string(), r.clone())))
        .collect();

    TaskInput {
        task_id: node.id.clone(),
        step: ctx.step.clone(),
        feedback: ctx.feedback.clone(),
        working_dir: ctx.working_dir.clone(),
        request,
        inputs,
        upstream,
    }
}

/// Templates inside string values are resolved; other values pass through.
fn resolve_value(value: &Value, ctx: &GraphContext, results: &ResultStore) -> Value {
    match value {
        Value::String(s) => Value::String(ctx.resolve_template(s, results)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_value(v, ctx, results))
                .collect(),
        ),
        other => other.clone(),
    }
}
