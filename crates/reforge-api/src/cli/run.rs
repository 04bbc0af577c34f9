//! `reforge run`: drive the plan.

use anyhow::Result;
use console::style;
use tokio::sync::broadcast;

use reforge_core::engine::{HaltReason, StepOutcome};
use reforge_types::event::EngineEvent;
use reforge_types::task::TaskStatus;

use crate::state::AppState;

pub async fn run(state: &AppState, once: bool, json: bool) -> Result<()> {
    let mut engine = state.build_engine().await?;
    let printer = tokio::spawn(print_events(engine.events().subscribe(), json));

    let result = tokio::select! {
        result = drive(&mut engine, once) => result,
        _ = tokio::signal::ctrl_c() => {
            // Plan and record writes are atomic; the step stays as last persisted.
            tracing::warn!("interrupted, stopping");
            printer.abort();
            anyhow::bail!("interrupted");
        }
    };
    let baseline = engine.baseline().to_path_buf();
    drop(engine);
    let _ = printer.await;

    let summary = result?;
    if json {
        let out = serde_json::json!({
            "halted": summary.halt.as_ref().map(ToString::to_string),
            "last_step": summary.last_step,
            "last_decision": summary.last_decision,
            "steps_approved": summary.steps_approved,
            "baseline": baseline,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    match &summary.halt {
        Some(HaltReason::PlanExhausted) => println!(
            "  {} Plan complete ({} step{} approved)",
            style("✓").green().bold(),
            summary.steps_approved,
            if summary.steps_approved == 1 { "" } else { "s" }
        ),
        Some(reason @ HaltReason::Rejected { .. }) => {
            println!("  {} Halted: {reason}", style("✗").red().bold())
        }
        Some(reason @ HaltReason::RetryLimitReached { .. }) => {
            println!("  {} Halted: {reason}", style("!").yellow().bold())
        }
        None => println!(
            "  {} Step '{}' -> {}",
            style("→").cyan().bold(),
            summary.last_step.as_deref().unwrap_or("?"),
            summary.last_decision.as_deref().unwrap_or("?")
        ),
    }
    println!("  baseline: {}", style(baseline.display()).dim());
    println!();
    Ok(())
}

#[derive(Debug, Default)]
struct RunSummary {
    halt: Option<HaltReason>,
    last_step: Option<String>,
    last_decision: Option<String>,
    steps_approved: u32,
}

async fn drive(engine: &mut crate::state::ConcreteEngine, once: bool) -> Result<RunSummary> {
    if !once {
        let outcome = engine.run().await?;
        return Ok(RunSummary {
            halt: Some(outcome.halt),
            steps_approved: outcome.steps_applied,
            ..Default::default()
        });
    }

    let summary = match engine.run_once().await? {
        StepOutcome::Applied { step_id, decision } => RunSummary {
            steps_approved: u32::from(decision == reforge_types::decision::Decision::Approve),
            last_step: Some(step_id),
            last_decision: Some(decision.to_string()),
            halt: None,
        },
        StepOutcome::Halted(reason) => RunSummary {
            halt: Some(reason),
            ..Default::default()
        },
    };
    Ok(summary)
}

/// Render engine events until the bus closes.
async fn print_events(mut events: broadcast::Receiver<EngineEvent>, json: bool) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("event printer lagged, {n} events skipped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if json {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
            continue;
        }
        if let Some(line) = describe(&event) {
            println!("{line}");
        }
    }
}

/// Styled one-line description. Phase changes are left to the logs.
fn describe(event: &EngineEvent) -> Option<String> {
    let line = match event {
        EngineEvent::StepStarted {
            step_id,
            name,
            attempt,
        } => format!(
            "\n  {} {} {} (attempt {attempt})",
            style("▶").cyan().bold(),
            style(step_id).yellow().bold(),
            name
        ),
        EngineEvent::SnapshotPrepared { working_dir, .. } => {
            format!("    working copy {}", style(working_dir.display()).dim())
        }
        EngineEvent::TaskStarted {
            task_id, provider, ..
        } => format!("    {} {task_id} via {provider}", style("…").dim()),
        EngineEvent::TaskFinished {
            task_id,
            status,
            duration_ms,
            ..
        } => {
            let marker = match status {
                TaskStatus::Success => style("✓").green(),
                TaskStatus::Error => style("✗").red(),
            };
            format!("    {marker} {task_id} {}", style(format!("{duration_ms}ms")).dim())
        }
        EngineEvent::DecisionApplied { step_id, decision } => {
            format!("  {} {step_id}: {}", style("⇒").bold(), style(decision).bold())
        }
        EngineEvent::PhaseChanged { .. } => return None,
        EngineEvent::Halted { reason } => format!("  {} {reason}", style("■").dim()),
    };
    Some(line)
}
