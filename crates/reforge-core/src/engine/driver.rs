//! Migration engine driver.
//!
//! The `MigrationEngine` walks the plan one step at a time:
//!
//! 1. **SelectingStep** -- next `todo` step; none halts with `PlanExhausted`.
//! 2. **PreparingSnapshot** -- fresh working copy of the current baseline.
//! 3. **RunningGraph** -- build and run the step's task graph.
//! 4. **AwaitingDecision** -- one decision string, from the human gate or the
//!    coordinator. A failed graph becomes an engine-generated retry.
//! 5. **Apply** -- approve promotes the copy and marks the step `done`;
//!    reject marks it `rejected`, discards the copy and halts; retry puts the
//!    step back to `todo` with the feedback as notes.
//!
//! Steps are strictly serialized: one engine drives one plan at a time.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use reforge_types::decision::Decision;
use reforge_types::error::{PlanError, ProtocolError};
use reforge_types::event::{EngineEvent, EnginePhase};
use reforge_types::plan::{PlanStep, StepStatus};
use reforge_types::record::RunRecord;

use crate::event::EventBus;
use crate::graph::{Coordinator, GraphContext, GraphError, GraphOutcome, Verdict};
use crate::repository::{PlanStore, RecordError, RunRecordStore};
use crate::snapshot::{SnapshotError, SnapshotManager};

use super::factory::GraphFactory;

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Fatal engine errors. Every one of them leaves the plan document and the
/// baseline as they were before the failing step began applying.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("step '{step_id}': {source}")]
    Protocol {
        step_id: String,
        #[source]
        source: ProtocolError,
    },

    #[error("step '{step_id}' has an invalid task graph: {source}")]
    Graph {
        step_id: String,
        #[source]
        source: GraphError,
    },

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Why the engine stopped without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    PlanExhausted,
    Rejected { step_id: String },
    RetryLimitReached { step_id: String, attempts: u32 },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::PlanExhausted => f.write_str("plan exhausted"),
            HaltReason::Rejected { step_id } => write!(f, "step '{step_id}' rejected"),
            HaltReason::RetryLimitReached { step_id, attempts } => {
                write!(f, "step '{step_id}' failed after {attempts} attempts")
            }
        }
    }
}

/// Result of driving a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A decision was applied and the engine can continue.
    Applied { step_id: String, decision: Decision },
    Halted(HaltReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    pub halt: HaltReason,
    /// Steps approved during this run.
    pub steps_applied: u32,
    /// Baseline in effect when the engine halted.
    pub baseline: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Baseline used when there is nothing to resume from.
    pub initial_baseline: PathBuf,
    /// Attempts allowed per step; `None` retries forever.
    pub max_attempts_per_step: Option<u32>,
    /// Continue from the baseline of the last run record if it still exists.
    pub resume: bool,
}

impl EngineOptions {
    pub fn new(initial_baseline: impl Into<PathBuf>) -> Self {
        Self {
            initial_baseline: initial_baseline.into(),
            max_attempts_per_step: None,
            resume: false,
        }
    }
}

// ---------------------------------------------------------------------------
// MigrationEngine
// ---------------------------------------------------------------------------

pub struct MigrationEngine<P, S, R> {
    plan: P,
    snapshots: S,
    records: R,
    graphs: Box<dyn GraphFactory>,
    coordinator: Coordinator,
    options: EngineOptions,
    events: EventBus,
    run_id: Uuid,
    baseline: PathBuf,
    attempts: HashMap<String, u32>,
    /// Retry feedback waiting for the step's next attempt.
    feedback: HashMap<String, String>,
    phase: EnginePhase,
    restored: bool,
}

impl<P, S, R> MigrationEngine<P, S, R>
where
    P: PlanStore,
    S: SnapshotManager,
    R: RunRecordStore,
{
    pub fn new(
        plan: P,
        snapshots: S,
        records: R,
        graphs: impl GraphFactory + 'static,
        coordinator: Coordinator,
        options: EngineOptions,
    ) -> Self {
        let events = EventBus::default();
        Self {
            plan,
            snapshots,
            records,
            graphs: Box::new(graphs),
            coordinator: coordinator.with_events(events.clone()),
            baseline: options.initial_baseline.clone(),
            options,
            events,
            run_id: Uuid::now_v7(),
            attempts: HashMap::new(),
            feedback: HashMap::new(),
            phase: EnginePhase::SelectingStep,
            restored: false,
        }
    }

    /// The bus engine and coordinator events are published on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn baseline(&self) -> &Path {
        &self.baseline
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn plan_store(&self) -> &P {
        &self.plan
    }

    pub fn record_store(&self) -> &R {
        &self.records
    }

    /// Drive steps until the engine halts.
    pub async fn run(&mut self) -> Result<EngineOutcome, EngineError> {
        tracing::info!(run_id = %self.run_id, baseline = %self.baseline.display(), "engine started");
        let mut steps_applied = 0;
        loop {
            match self.run_once().await? {
                StepOutcome::Applied { decision, .. } => {
                    if decision == Decision::Approve {
                        steps_applied += 1;
                    }
                }
                StepOutcome::Halted(halt) => {
                    return Ok(EngineOutcome {
                        halt,
                        steps_applied,
                        baseline: self.baseline.clone(),
                    });
                }
            }
        }
    }

    /// Drive exactly one step attempt.
    pub async fn run_once(&mut self) -> Result<StepOutcome, EngineError> {
        self.restore().await?;

        self.enter(EnginePhase::SelectingStep, None);
        let Some(step) = self.plan.next_todo().await? else {
            return Ok(self.halt(HaltReason::PlanExhausted));
        };

        let attempt = {
            let count = self.attempts.entry(step.id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some(max) = self.options.max_attempts_per_step {
            if attempt > max {
                return self.give_up(&step, max).await;
            }
        }

        tracing::info!(step_id = %step.id, name = %step.name, attempt, "starting step");
        self.events.publish(EngineEvent::StepStarted {
            step_id: step.id.clone(),
            name: step.name.clone(),
            attempt,
        });

        self.enter(EnginePhase::PreparingSnapshot, Some(&step.id));
        let working = self.snapshots.prepare(&step.id, &self.baseline).await?;
        self.events.publish(EngineEvent::SnapshotPrepared {
            step_id: step.id.clone(),
            working_dir: working.clone(),
        });

        self.enter(EnginePhase::RunningGraph, Some(&step.id));
        let graph_error = |source: GraphError| EngineError::Graph {
            step_id: step.id.clone(),
            source,
        };
        let graph = self.graphs.build(&step).map_err(graph_error)?;
        // Only notes written by a retry are fed back; hand-written notes are not.
        let feedback = self
            .feedback
            .get(&step.id)
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        let ctx = GraphContext::new(step.clone(), feedback, working.clone());
        let outcome = self
            .coordinator
            .run(&graph, &ctx)
            .await
            .map_err(graph_error)?;

        self.enter(EnginePhase::AwaitingDecision, Some(&step.id));
        let decision = match &outcome.verdict {
            Verdict::Decided { raw, source } => match Decision::parse(raw) {
                Ok(decision) => {
                    tracing::info!(step_id = %step.id, source = ?source, decision = %decision, "decision received");
                    decision
                }
                Err(source) => {
                    tracing::error!(step_id = %step.id, raw = %raw, "unrecognized decision, halting");
                    if let Err(e) = self.write_record(&step, attempt, raw, &outcome, true).await {
                        tracing::warn!(step_id = %step.id, error = %e, "failed to write run record");
                    }
                    self.enter(EnginePhase::Halted, Some(&step.id));
                    return Err(EngineError::Protocol {
                        step_id: step.id.clone(),
                        source,
                    });
                }
            },
            Verdict::Failed { task_id, error } => {
                tracing::warn!(step_id = %step.id, task_id = %task_id, error = %error, "task graph failed, retrying step");
                Decision::RetryWithFeedback(format!("engine: task '{task_id}' failed: {error}"))
            }
        };

        self.apply(&step, attempt, &working, decision, &outcome).await
    }

    async fn apply(
        &mut self,
        step: &PlanStep,
        attempt: u32,
        working: &Path,
        decision: Decision,
        outcome: &GraphOutcome,
    ) -> Result<StepOutcome, EngineError> {
        let wire = decision.to_string();
        match &decision {
            Decision::Approve => {
                self.enter(EnginePhase::ApplyApprove, Some(&step.id));
                let promoted = self.snapshots.promote(working).await?;
                self.plan
                    .update_status(&step.id, StepStatus::Done, None)
                    .await?;
                tracing::info!(step_id = %step.id, baseline = %promoted.display(), "step approved, baseline advanced");
                self.baseline = promoted;
                self.attempts.remove(&step.id);
                self.feedback.remove(&step.id);
                self.write_record(step, attempt, &wire, outcome, false).await?;
            }
            Decision::Reject => {
                self.enter(EnginePhase::ApplyReject, Some(&step.id));
                self.plan
                    .update_status(&step.id, StepStatus::Rejected, None)
                    .await?;
                self.snapshots.discard(working).await?;
                tracing::info!(step_id = %step.id, "step rejected");
                self.write_record(step, attempt, &wire, outcome, true).await?;
                self.publish_applied(step, &wire);
                return Ok(self.halt(HaltReason::Rejected {
                    step_id: step.id.clone(),
                }));
            }
            Decision::RetryWithFeedback(feedback) => {
                self.enter(EnginePhase::ApplyRetry, Some(&step.id));
                self.plan
                    .update_status(&step.id, StepStatus::Todo, Some(feedback.as_str()))
                    .await?;
                self.snapshots.retain(working).await?;
                self.feedback.insert(step.id.clone(), feedback.clone());
                tracing::info!(step_id = %step.id, attempt, feedback = %feedback, "step sent back for retry");
                self.write_record(step, attempt, &wire, outcome, false).await?;
            }
        }

        self.publish_applied(step, &wire);
        Ok(StepOutcome::Applied {
            step_id: step.id.clone(),
            decision,
        })
    }

    /// Mark the step failed once it has used up its attempts.
    async fn give_up(&mut self, step: &PlanStep, attempts: u32) -> Result<StepOutcome, EngineError> {
        let mut notes = format!("retry limit reached after {attempts} attempts");
        if let Some(feedback) = self.feedback.remove(&step.id) {
            notes.push_str("; last feedback: ");
            notes.push_str(&feedback);
        }
        tracing::warn!(step_id = %step.id, attempts, "retry limit reached, marking step failed");
        self.plan
            .update_status(&step.id, StepStatus::Failed, Some(notes.as_str()))
            .await?;
        Ok(self.halt(HaltReason::RetryLimitReached {
            step_id: step.id.clone(),
            attempts,
        }))
    }

    /// Pick up the previous run once per engine: a pending retry's feedback
    /// always, its baseline only when resuming.
    async fn restore(&mut self) -> Result<(), EngineError> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        let record = match self.records.load().await {
            Ok(record) => record,
            Err(e) if !self.options.resume => {
                tracing::warn!(error = %e, "could not read run record, starting without retry feedback");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let Some(record) = record else {
            return Ok(());
        };
        if !record.halted {
            if let Ok(Decision::RetryWithFeedback(text)) = Decision::parse(&record.decision) {
                tracing::debug!(step_id = %record.step_id, "restored pending retry feedback");
                self.feedback.insert(record.step_id.clone(), text);
            }
        }
        if !self.options.resume {
            return Ok(());
        }

        if record.baseline.is_dir() {
            tracing::info!(
                baseline = %record.baseline.display(),
                last_step = %record.step_id,
                "resuming from recorded baseline"
            );
            self.baseline = record.baseline;
        } else {
            tracing::warn!(
                baseline = %record.baseline.display(),
                "recorded baseline no longer exists, using configured baseline"
            );
        }
        Ok(())
    }

    async fn write_record(
        &self,
        step: &PlanStep,
        attempt: u32,
        decision: &str,
        outcome: &GraphOutcome,
        halted: bool,
    ) -> Result<(), EngineError> {
        let record = RunRecord {
            run_id: self.run_id,
            step_id: step.id.clone(),
            attempt,
            decision: decision.to_string(),
            results: outcome.results_map(),
            execution_order: outcome.execution_order.clone(),
            baseline: self.baseline.clone(),
            halted,
            recorded_at: Utc::now(),
        };
        self.records.save(&record).await?;
        Ok(())
    }

    fn enter(&mut self, phase: EnginePhase, step_id: Option<&str>) {
        self.phase = phase;
        tracing::debug!(step_id = step_id.unwrap_or("-"), phase = ?phase, "engine phase");
        self.events.publish(EngineEvent::PhaseChanged {
            step_id: step_id.map(str::to_string),
            phase,
        });
    }

    fn publish_applied(&self, step: &PlanStep, decision: &str) {
        self.events.publish(EngineEvent::DecisionApplied {
            step_id: step.id.clone(),
            decision: decision.to_string(),
        });
    }

    fn halt(&mut self, reason: HaltReason) -> StepOutcome {
        self.enter(EnginePhase::Halted, None);
        tracing::info!(run_id = %self.run_id, reason = %reason, "engine halted");
        self.events.publish(EngineEvent::Halted {
            reason: reason.to_string(),
        });
        StepOutcome::Halted(reason)
    }
}
