//! Task graph node and result types.
//!
//! A step's task graph is declared as a list of `TaskNode`s (usually in the
//! pipeline YAML). Each node names the capability it needs through its
//! `TaskKind` and produces exactly one `TaskResult`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default capability name used by human gates that do not name one.
pub const DEFAULT_HUMAN_CAPABILITY: &str = "human";

// ---------------------------------------------------------------------------
// Task definition
// ---------------------------------------------------------------------------

/// A single node in a step's task graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique within the graph.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// What the task does and which capability performs it.
    pub kind: TaskKind,
    /// Named inputs folded into the task's input context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputBinding>,
    /// Explicit upstream tasks. `result_of` inputs add implicit edges.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            inputs: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on(mut self, task: impl Into<String>) -> Self {
        self.depends_on.push(task.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, binding: InputBinding) -> Self {
        self.inputs.insert(name.into(), binding);
        self
    }

    /// Every upstream task id: explicit `depends_on` entries first, then
    /// `result_of` bindings, without duplicates.
    pub fn upstream_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        let bound = self.inputs.values().filter_map(|b| match b {
            InputBinding::ResultOf { task } => Some(task.as_str()),
            InputBinding::Literal { .. } => None,
        });
        for id in self.depends_on.iter().map(String::as_str).chain(bound) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

/// Task-kind specific configuration.
///
/// Internally tagged by `type`:
/// ```yaml
/// kind:
///   type: tool
///   capability: compiler
///   operation: build
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Free-form instruction answered by a reasoning provider.
    Reasoning {
        capability: String,
        instruction: String,
    },
    /// A named operation of a deterministic tool.
    Tool {
        capability: String,
        operation: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        args: BTreeMap<String, serde_json::Value>,
    },
    /// Suspends the graph until a human decision arrives.
    HumanGate {
        #[serde(default = "default_human_capability")]
        capability: String,
        prompt: String,
    },
}

fn default_human_capability() -> String {
    DEFAULT_HUMAN_CAPABILITY.to_string()
}

impl TaskKind {
    pub fn capability(&self) -> &str {
        match self {
            TaskKind::Reasoning { capability, .. }
            | TaskKind::Tool { capability, .. }
            | TaskKind::HumanGate { capability, .. } => capability,
        }
    }

    /// The provider kind able to serve this task.
    pub fn capability_kind(&self) -> CapabilityKind {
        match self {
            TaskKind::Reasoning { .. } => CapabilityKind::Reasoning,
            TaskKind::Tool { .. } => CapabilityKind::Tool,
            TaskKind::HumanGate { .. } => CapabilityKind::HumanInput,
        }
    }

    pub fn is_human_gate(&self) -> bool {
        matches!(self, TaskKind::HumanGate { .. })
    }
}

/// How a named task input gets its value.
///
/// `{ value: ... }` is a literal; `{ result_of: <task id> }` is the full
/// `TaskResult` of an upstream task, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputBinding {
    ResultOf {
        #[serde(rename = "result_of")]
        task: String,
    },
    Literal {
        value: serde_json::Value,
    },
}

/// The three families of external workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Reasoning,
    Tool,
    HumanInput,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityKind::Reasoning => "reasoning",
            CapabilityKind::Tool => "tool",
            CapabilityKind::HumanInput => "human_input",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Task result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Error,
}

/// Output of one task. Written once per task id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    /// Structured output (or `{"error": ...}` on failure).
    pub payload: serde_json::Value,
    /// Textual rendering consumed by templates and decision synthesis.
    pub raw_text: String,
}

impl TaskResult {
    pub fn success(payload: serde_json::Value, raw_text: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Success,
            payload,
            raw_text: raw_text.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: TaskStatus::Error,
            payload: serde_json::json!({ "error": message }),
            raw_text: message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_tagged_by_type() {
        let json = r#"{"type": "tool", "capability": "compiler", "operation": "build"}"#;
        let kind: TaskKind = serde_json::from_str(json).unwrap();
        assert_eq!(kind.capability(), "compiler");
        assert_eq!(kind.capability_kind(), CapabilityKind::Tool);
        assert!(matches!(kind, TaskKind::Tool { ref args, .. } if args.is_empty()));
    }

    #[test]
    fn test_human_gate_defaults_capability() {
        let kind: TaskKind =
            serde_json::from_str(r#"{"type": "human_gate", "prompt": "ok?"}"#).unwrap();
        assert_eq!(kind.capability(), DEFAULT_HUMAN_CAPABILITY);
        assert!(kind.is_human_gate());
    }

    #[test]
    fn test_input_binding_shapes() {
        let bound: InputBinding = serde_json::from_str(r#"{"result_of": "analyze"}"#).unwrap();
        assert_eq!(
            bound,
            InputBinding::ResultOf {
                task: "analyze".to_string()
            }
        );

        let literal: InputBinding = serde_json::from_str(r#"{"value": [1, 2]}"#).unwrap();
        assert_eq!(
            literal,
            InputBinding::Literal {
                value: serde_json::json!([1, 2])
            }
        );
    }

    #[test]
    fn test_upstream_ids_merges_bindings_without_duplicates() {
        let node = TaskNode::new(
            "review",
            TaskKind::Reasoning {
                capability: "llm".into(),
                instruction: "review".into(),
            },
        )
        .depends_on("build")
        .with_input(
            "build_log",
            InputBinding::ResultOf {
                task: "build".into(),
            },
        )
        .with_input(
            "analysis",
            InputBinding::ResultOf {
                task: "analyze".into(),
            },
        )
        .with_input(
            "style",
            InputBinding::Literal {
                value: serde_json::json!("terse"),
            },
        );

        assert_eq!(node.upstream_ids(), vec!["build", "analyze"]);
    }

    #[test]
    fn test_error_result_carries_message() {
        let result = TaskResult::error("boom");
        assert!(!result.is_success());
        assert_eq!(result.raw_text, "boom");
        assert_eq!(result.payload["error"], "boom");
    }
}
