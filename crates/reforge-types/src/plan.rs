//! Plan domain types.
//!
//! A `Plan` is the ordered list of migration steps persisted as one JSON
//! array. Every step moves through the `StepStatus` lifecycle as the engine
//! drives it.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Lifecycle status of a plan step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Skipped,
    Failed,
    Rejected,
}

impl StepStatus {
    pub const ALL: [StepStatus; 6] = [
        StepStatus::Todo,
        StepStatus::InProgress,
        StepStatus::Done,
        StepStatus::Skipped,
        StepStatus::Failed,
        StepStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Todo => "todo",
            StepStatus::InProgress => "in_progress",
            StepStatus::Done => "done",
            StepStatus::Skipped => "skipped",
            StepStatus::Failed => "failed",
            StepStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "invalid step status '{s}' (expected one of: todo, in_progress, done, skipped, failed, rejected)"
                )
            })
    }
}

/// A single migration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Opaque identifier, unique within the plan.
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Missing in older documents; loads as `todo`.
    #[serde(default)]
    pub status: StepStatus,
    /// Free text. Carries the feedback of the last `retry_with_feedback` decision.
    #[serde(default)]
    pub notes: String,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            status: StepStatus::Todo,
            notes: String::new(),
        }
    }
}

/// The ordered plan document. Serializes as a bare JSON array of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// First step in document order whose status is `todo`.
    pub fn next_todo(&self) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Todo)
    }

    pub fn get(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Returns the first id that appears more than once, if any.
    pub fn duplicate_id(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .find(|s| !seen.insert(s.id.as_str()))
            .map(|s| s.id.as_str())
    }

    /// Overwrite the status of step `id`, and its notes when `notes` is given.
    ///
    /// Leaves the plan untouched and returns `PlanError::NotFound` when no
    /// step has that id.
    pub fn update_status(
        &mut self,
        id: &str,
        status: StepStatus,
        notes: Option<&str>,
    ) -> Result<(), PlanError> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| PlanError::NotFound(id.to_string()))?;
        step.status = status;
        if let Some(notes) = notes {
            step.notes = notes.to_string();
        }
        Ok(())
    }
}
