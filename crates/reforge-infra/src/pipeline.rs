//! Pipeline definitions: the YAML file that declares each step's task graph.
//!
//! ```yaml
//! policy: hierarchical
//! manager:
//!   synthesizer: planner
//!   delegation:
//!     coder: [coder-large, coder]
//!   max_parallel: 2
//! tasks:
//!   - id: analyze
//!     kind: { type: reasoning, capability: coder, instruction: "Port {{ step.name }}" }
//!   - id: build
//!     kind: { type: tool, capability: build, operation: check }
//!     depends_on: [analyze]
//! steps:
//!   s3:
//!     tasks:
//!       - id: review
//!         kind: { type: human_gate, prompt: "Ship {{ step.id }}?" }
//! ```
//!
//! The top-level graph applies to every step; an entry under `steps` replaces
//! it wholesale for that step id.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use reforge_core::engine::GraphFactory;
use reforge_core::graph::dag::DEFAULT_MAX_PARALLEL;
use reforge_core::graph::{
    DelegationTable, GraphError, GraphPolicy, HierarchicalPolicy, ManagerSpec, TaskGraph,
};
use reforge_types::error::ConfigError;
use reforge_types::plan::PlanStep;
use reforge_types::task::TaskNode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Sequential,
    Hierarchical,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default)]
    pub delegation: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

/// One task graph declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<ManagerDefinition>,
    #[serde(default)]
    pub tasks: Vec<TaskNode>,
}

impl GraphDefinition {
    /// Validate the declaration into an executable graph.
    pub fn build_graph(&self) -> Result<TaskGraph, GraphError> {
        let policy = match self.policy {
            PolicyKind::Sequential => GraphPolicy::Sequential,
            PolicyKind::Hierarchical => {
                let manager = self.manager.clone().unwrap_or_default();
                GraphPolicy::Hierarchical(HierarchicalPolicy {
                    manager: ManagerSpec {
                        synthesizer: manager.synthesizer,
                        instruction: manager.instruction,
                        delegation: DelegationTable::from(manager.delegation),
                    },
                    max_parallel: manager.max_parallel,
                })
            }
        };

        let nodes = self
            .tasks
            .iter()
            .cloned()
            .map(|mut node| {
                if node.name.is_empty() {
                    node.name = node.id.clone();
                }
                node
            })
            .collect();
        TaskGraph::new(nodes, policy)
    }
}

/// The whole pipeline file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(flatten)]
    pub default: GraphDefinition,
    /// Per-step replacements of the default graph.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub steps: BTreeMap<String, GraphDefinition>,
}

impl PipelineDefinition {
    /// The graph declaration that applies to `step_id`.
    pub fn graph_for(&self, step_id: &str) -> &GraphDefinition {
        self.steps.get(step_id).unwrap_or(&self.default)
    }

    /// Build every declared graph once, so definition errors surface at
    /// startup instead of when the step is reached.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let overrides = self.steps.iter().map(|(id, def)| (format!("steps.{id}"), def));
        let all = std::iter::once(("default graph".to_string(), &self.default)).chain(overrides);

        for (label, def) in all {
            // An empty default is fine when every step is overridden.
            if label == "default graph" && def.tasks.is_empty() && !self.steps.is_empty() {
                continue;
            }
            def.build_graph()
                .map_err(|e| ConfigError::Invalid(format!("pipeline {label}: {e}")))?;
        }
        Ok(())
    }
}

pub fn parse_pipeline_yaml(content: &str) -> Result<PipelineDefinition, ConfigError> {
    serde_yaml_ng::from_str(content)
        .map_err(|e| ConfigError::Invalid(format!("malformed pipeline: {e}")))
}

pub async fn load_pipeline(path: &Path) -> Result<PipelineDefinition, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing {
                what: "pipeline file",
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    parse_pipeline_yaml(&content)
        .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))
}

/// Builds each step's graph from a loaded pipeline.
#[derive(Debug, Clone)]
pub struct PipelineGraphFactory {
    pipeline: PipelineDefinition,
}

impl PipelineGraphFactory {
    pub fn new(pipeline: PipelineDefinition) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &PipelineDefinition {
        &self.pipeline
    }
}

impl GraphFactory for PipelineGraphFactory {
    fn build(&self, step: &PlanStep) -> Result<TaskGraph, GraphError> {
        self.pipeline.graph_for(&step.id).build_graph()
    }
}
