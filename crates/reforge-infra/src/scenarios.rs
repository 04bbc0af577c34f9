//! End-to-end engine runs over the real filesystem adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use reforge_core::capability::{
    BoxCapabilityProvider, CapabilityRegistry, ChannelHumanInput, HumanInputHandle,
};
use reforge_core::engine::{
    EngineError, EngineOptions, HaltReason, MigrationEngine, StepOutcome,
};
use reforge_core::graph::Coordinator;
use reforge_core::repository::{PlanStore, RunRecordStore};
use reforge_types::config::{ToolConfig, ToolOperation};
use reforge_types::decision::Decision;
use reforge_types::plan::StepStatus;

use crate::pipeline::{PipelineGraphFactory, parse_pipeline_yaml};
use crate::plan::JsonPlanStore;
use crate::record::JsonRunRecordStore;
use crate::snapshot::LocalSnapshotManager;
use crate::tool::CommandToolProvider;

const PLAN: &str = r#"[
  {"id": "s1", "name": "Port module", "description": "Rewrite the module"}
]"#;

const PIPELINE: &str = r#"
tasks:
  - id: migrate
    kind: { type: tool, capability: shell, operation: migrate }
  - id: review
    kind: { type: human_gate, prompt: "Accept {{ step.id }}? {{ tasks.migrate.raw_text }}" }
    depends_on: [migrate]
"#;

type Engine = MigrationEngine<JsonPlanStore, LocalSnapshotManager, JsonRunRecordStore>;

struct Project {
    tmp: TempDir,
    baseline: PathBuf,
}

impl Project {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let baseline = tmp.path().join("baseline");
        std::fs::create_dir_all(&baseline).unwrap();
        std::fs::write(baseline.join("A.txt"), "alpha").unwrap();
        std::fs::write(tmp.path().join("plan.json"), PLAN).unwrap();
        Self { tmp, baseline }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    fn plan_text(&self) -> String {
        std::fs::read_to_string(self.path("plan.json")).unwrap()
    }

    fn engine(&self, resume: bool) -> (Engine, HumanInputHandle) {
        let (human, handle) = ChannelHumanInput::new("human", 4);
        let shell = CommandToolProvider::new(
            "shell",
            ToolConfig {
                max_output_bytes: 2000,
                operations: [(
                    "migrate".to_string(),
                    ToolOperation {
                        program: "sh".to_string(),
                        args: vec![
                            "-c".to_string(),
                            "printf '%s' \"$REFORGE_FEEDBACK\" > feedback.txt; echo ported > B.txt; echo done"
                                .to_string(),
                        ],
                        timeout_secs: 30,
                    },
                )]
                .into_iter()
                .collect(),
            },
        );
        let registry = CapabilityRegistry::new()
            .with(BoxCapabilityProvider::new(human))
            .with(BoxCapabilityProvider::new(shell));

        let mut options = EngineOptions::new(&self.baseline);
        options.resume = resume;
        let engine = MigrationEngine::new(
            JsonPlanStore::new(self.path("plan.json")),
            LocalSnapshotManager::new(self.path("work")),
            JsonRunRecordStore::new(self.path(".reforge/state.json")),
            PipelineGraphFactory::new(parse_pipeline_yaml(PIPELINE).unwrap()),
            Coordinator::new(Arc::new(registry)),
            options,
        );
        (engine, handle)
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn test_approve_promotes_working_copy_and_marks_done() {
    let project = Project::new();
    let (mut engine, human) = project.engine(false);
    human.decide("approve").await.unwrap();

    let outcome = engine.run().await.unwrap();

    assert_eq!(outcome.halt, HaltReason::PlanExhausted);
    assert_eq!(outcome.steps_applied, 1);
    assert_eq!(outcome.baseline, project.path("work/s1"));
    assert_eq!(read(&outcome.baseline.join("A.txt")), "alpha");
    assert_eq!(read(&outcome.baseline.join("B.txt")), "ported\n");
    // The original baseline is never modified.
    assert!(!project.baseline.join("B.txt").exists());

    let plan = engine.plan_store().load().await.unwrap();
    assert_eq!(plan.steps[0].status, StepStatus::Done);

    let record = engine.record_store().load().await.unwrap().unwrap();
    assert_eq!(record.decision, "approve");
    assert_eq!(record.execution_order, vec!["migrate", "review"]);
    assert_eq!(record.baseline, project.path("work/s1"));
    assert!(!record.halted);
}

#[tokio::test]
async fn test_reject_discards_working_copy_and_halts() {
    let project = Project::new();
    let (mut engine, human) = project.engine(false);
    human.decide("reject").await.unwrap();

    let outcome = engine.run().await.unwrap();

    assert_eq!(
        outcome.halt,
        HaltReason::Rejected {
            step_id: "s1".to_string()
        }
    );
    assert_eq!(outcome.baseline, project.baseline);
    assert!(!project.path("work/s1").exists());
    assert_eq!(read(&project.baseline.join("A.txt")), "alpha");

    let plan = engine.plan_store().load().await.unwrap();
    assert_eq!(plan.steps[0].status, StepStatus::Rejected);
    assert!(engine.record_store().load().await.unwrap().unwrap().halted);
}

#[tokio::test]
async fn test_retry_keeps_step_todo_and_feeds_back_into_next_attempt() {
    let project = Project::new();
    let (mut engine, human) = project.engine(false);
    human.decide("retry_with_feedback: fix X ").await.unwrap();

    let first = engine.run_once().await.unwrap();

    assert_eq!(
        first,
        StepOutcome::Applied {
            step_id: "s1".to_string(),
            decision: Decision::RetryWithFeedback("fix X".to_string()),
        }
    );
    let plan = engine.plan_store().load().await.unwrap();
    assert_eq!(plan.steps[0].status, StepStatus::Todo);
    assert_eq!(plan.steps[0].notes, "fix X");
    // Retained for inspection; baseline untouched.
    assert!(project.path("work/s1/B.txt").exists());
    assert_eq!(engine.baseline(), project.baseline.as_path());

    human.decide("approve").await.unwrap();
    let outcome = engine.run().await.unwrap();

    assert_eq!(outcome.halt, HaltReason::PlanExhausted);
    assert_eq!(read(&outcome.baseline.join("feedback.txt")), "fix X");
    let record = engine.record_store().load().await.unwrap().unwrap();
    assert_eq!(record.attempt, 2);
}

#[tokio::test]
async fn test_unrecognized_decision_is_fatal_and_leaves_plan_unchanged() {
    let project = Project::new();
    let before = project.plan_text();
    let (mut engine, human) = project.engine(false);
    human.decide("maybe").await.unwrap();

    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, EngineError::Protocol { ref step_id, .. } if step_id == "s1"));
    assert_eq!(project.plan_text(), before);
    assert_eq!(read(&project.baseline.join("A.txt")), "alpha");
}

#[tokio::test]
async fn test_resume_continues_from_recorded_baseline() {
    let project = Project::new();
    std::fs::write(
        project.path("plan.json"),
        r#"[{"id": "s1", "name": "One"}, {"id": "s2", "name": "Two"}]"#,
    )
    .unwrap();

    {
        let (mut engine, human) = project.engine(true);
        human.decide("approve").await.unwrap();
        let first = engine.run_once().await.unwrap();
        assert!(matches!(first, StepOutcome::Applied { ref step_id, .. } if step_id == "s1"));
    }
    std::fs::write(project.path("work/s1/marker.txt"), "from s1").unwrap();

    let (mut engine, human) = project.engine(true);
    human.decide("approve").await.unwrap();
    let outcome = engine.run().await.unwrap();

    assert_eq!(outcome.steps_applied, 1);
    assert_eq!(outcome.baseline, project.path("work/s2"));
    // s2 was copied from s1's promoted tree, not from the initial baseline.
    assert_eq!(read(&project.path("work/s2/marker.txt")), "from s1");
    assert_eq!(read(&project.path("work/s2/A.txt")), "alpha");
    let plan = engine.plan_store().load().await.unwrap();
    assert!(plan.steps.iter().all(|s| s.status == StepStatus::Done));
}
