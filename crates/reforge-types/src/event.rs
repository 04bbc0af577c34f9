//! Event types for the engine event bus.
//!
//! `EngineEvent` is broadcast while the engine drives a plan. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::task::TaskStatus;

/// Engine state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    SelectingStep,
    PreparingSnapshot,
    RunningGraph,
    AwaitingDecision,
    ApplyApprove,
    ApplyReject,
    ApplyRetry,
    Halted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The engine entered a new phase.
    PhaseChanged {
        step_id: Option<String>,
        phase: EnginePhase,
    },

    /// A step attempt started.
    StepStarted {
        step_id: String,
        name: String,
        attempt: u32,
    },

    /// A working copy is ready for the step.
    SnapshotPrepared {
        step_id: String,
        working_dir: PathBuf,
    },

    /// A task was handed to a provider.
    TaskStarted {
        step_id: String,
        task_id: String,
        provider: String,
    },

    /// A task produced its result (or was refused).
    TaskFinished {
        step_id: String,
        task_id: String,
        status: TaskStatus,
        duration_ms: u64,
    },

    /// A decision was applied to the plan and the snapshot.
    DecisionApplied { step_id: String, decision: String },

    /// The engine stopped.
    Halted { reason: String },
}
