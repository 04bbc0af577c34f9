//! Task graph construction and validation.
//!
//! Uses `petgraph` to model task dependencies as a directed graph. A graph
//! that fails validation is never executed.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use thiserror::Error;

use reforge_types::task::{CapabilityKind, TaskNode};

use super::delegation::ManagerSpec;

/// Default bound on concurrently running tasks under the hierarchical policy.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Errors in a task graph definition or its execution bookkeeping.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("task graph has no tasks")]
    Empty,

    #[error("duplicate task id '{0}'")]
    DuplicateTask(String),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("task '{0}' depends on itself")]
    SelfDependency(String),

    #[error("cycle detected involving task '{0}'")]
    CycleDetected(String),

    #[error("task '{task}' depends on '{dependency}', which is declared after it")]
    ForwardDependency { task: String, dependency: String },

    #[error("at most one human gate is allowed, found: {}", .0.join(", "))]
    MultipleHumanGates(Vec<String>),

    #[error("hierarchical policy needs max_parallel >= 1")]
    InvalidParallelism,

    #[error("task '{task}' uses unknown capability '{capability}'")]
    UnknownCapability { task: String, capability: String },

    #[error("task '{task}' needs a {expected} capability but '{capability}' is {actual}")]
    CapabilityKindMismatch {
        task: String,
        capability: String,
        expected: CapabilityKind,
        actual: CapabilityKind,
    },

    #[error("result for task '{0}' was already recorded")]
    DuplicateResult(String),
}

/// How the coordinator executes a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphPolicy {
    /// Declaration order, one task at a time.
    Sequential,
    /// A manager dispatches ready tasks, possibly concurrently.
    Hierarchical(HierarchicalPolicy),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchicalPolicy {
    pub manager: ManagerSpec,
    pub max_parallel: usize,
}

impl HierarchicalPolicy {
    pub fn new(manager: ManagerSpec) -> Self {
        Self {
            manager,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

/// A validated, immutable task graph.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    /// Upstream node indices per node, in the node's declared order.
    upstream: Vec<Vec<usize>>,
    policy: GraphPolicy,
}

impl TaskGraph {
    /// Validate `nodes` under `policy` and build the graph.
    ///
    /// Checks, in order: non-empty, unique ids, every dependency (explicit or
    /// via `result_of`) exists and is not the task itself, acyclic, at most one
    /// human gate, and under `Sequential` that dependencies are declared earlier.
    pub fn new(nodes: Vec<TaskNode>, policy: GraphPolicy) -> Result<Self, GraphError> {
        if nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.as_str(), i).is_some() {
                return Err(GraphError::DuplicateTask(node.id.clone()));
            }
        }

        let mut upstream = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut deps = Vec::new();
            for dep in node.upstream_ids() {
                if dep == node.id {
                    return Err(GraphError::SelfDependency(node.id.clone()));
                }
                let dep_idx = index
                    .get(dep)
                    .copied()
                    .ok_or_else(|| GraphError::UnknownDependency {
                        task: node.id.clone(),
                        dependency: dep.to_string(),
                    })?;
                deps.push(dep_idx);
            }
            upstream.push(deps);
        }

        // Edge from dependency -> dependent
        let mut graph = DiGraph::<&str, ()>::new();
        let node_indices: Vec<_> = nodes.iter().map(|n| graph.add_node(n.id.as_str())).collect();
        for (to, deps) in upstream.iter().enumerate() {
            for &from in deps {
                graph.add_edge(node_indices[from], node_indices[to], ());
            }
        }
        toposort(&graph, None)
            .map_err(|cycle| GraphError::CycleDetected(graph[cycle.node_id()].to_string()))?;

        let gates: Vec<String> = nodes
            .iter()
            .filter(|n| n.kind.is_human_gate())
            .map(|n| n.id.clone())
            .collect();
        if gates.len() > 1 {
            return Err(GraphError::MultipleHumanGates(gates));
        }

        match &policy {
            GraphPolicy::Sequential => {
                for (i, deps) in upstream.iter().enumerate() {
                    if let Some(&later) = deps.iter().find(|&&d| d > i) {
                        return Err(GraphError::ForwardDependency {
                            task: nodes[i].id.clone(),
                            dependency: nodes[later].id.clone(),
                        });
                    }
                }
            }
            GraphPolicy::Hierarchical(hierarchical) => {
                if hierarchical.max_parallel == 0 {
                    return Err(GraphError::InvalidParallelism);
                }
            }
        }

        Ok(Self {
            nodes,
            upstream,
            policy,
        })
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn policy(&self) -> &GraphPolicy {
        &self.policy
    }

    /// Upstream node indices of node `idx`.
    pub fn upstream_of(&self, idx: usize) -> &[usize] {
        &self.upstream[idx]
    }

    pub fn human_gate(&self) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.kind.is_human_gate())
    }

    /// Every node that directly or transitively depends on node `idx`.
    pub fn dependents_of(&self, idx: usize) -> HashSet<usize> {
        let mut found = HashSet::new();
        let mut frontier = vec![idx];
        while let Some(current) = frontier.pop() {
            for (candidate, deps) in self.upstream.iter().enumerate() {
                if deps.contains(&current) && found.insert(candidate) {
                    frontier.push(candidate);
                }
            }
        }
        found
    }
}
