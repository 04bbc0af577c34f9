//! `reforge plan`: list and edit plan steps.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use reforge_core::repository::PlanStore;
use reforge_types::plan::{Plan, StepStatus};

use crate::state::AppState;

pub async fn list(state: &AppState, json: bool) -> Result<()> {
    let plan = state.plan_store().load().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    if plan.is_empty() {
        println!();
        println!(
            "  {} The plan at {} has no steps.",
            style("i").blue().bold(),
            style(state.config.paths.plan_file.display()).yellow()
        );
        println!();
        return Ok(());
    }

    println!();
    println!("{}", plan_table(&plan));
    println!();
    let next = plan
        .next_todo()
        .map(|s| s.id.as_str())
        .unwrap_or("none (plan exhausted)");
    println!("  next: {}", style(next).bold());
    println!();
    Ok(())
}

fn status_cell(status: StepStatus) -> Cell {
    let color = match status {
        StepStatus::Todo => Color::White,
        StepStatus::InProgress => Color::Cyan,
        StepStatus::Done => Color::Green,
        StepStatus::Skipped => Color::DarkGrey,
        StepStatus::Failed => Color::Yellow,
        StepStatus::Rejected => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

fn plan_table(plan: &Plan) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Id").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Notes").fg(Color::White),
    ]);

    for (idx, step) in plan.steps.iter().enumerate() {
        let notes = if step.notes.chars().count() > 60 {
            format!("{}...", step.notes.chars().take(57).collect::<String>())
        } else {
            step.notes.clone()
        };
        table.add_row(vec![
            Cell::new(idx + 1).fg(Color::DarkGrey),
            Cell::new(&step.id).fg(Color::Cyan),
            Cell::new(&step.name),
            status_cell(step.status),
            Cell::new(notes),
        ]);
    }
    table
}

pub async fn set(
    state: &AppState,
    id: &str,
    status: StepStatus,
    notes: Option<&str>,
    json: bool,
) -> Result<()> {
    let store = state.plan_store();
    store.update_status(id, status, notes).await?;

    if json {
        let step = store.get(id).await?;
        println!("{}", serde_json::to_string_pretty(&step)?);
    } else {
        println!(
            "  {} {} is now {}",
            style("✓").green().bold(),
            style(id).cyan(),
            style(status).bold()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reforge_types::plan::PlanStep;

    #[test]
    fn test_table_lists_every_step_with_truncated_notes() {
        let plan = Plan::new(vec![
            PlanStep {
                status: StepStatus::Done,
                ..PlanStep::new("s1", "Extract deps")
            },
            PlanStep {
                notes: "x".repeat(80),
                ..PlanStep::new("s2", "Port parser")
            },
        ]);

        let rendered = plan_table(&plan).to_string();

        assert!(rendered.contains("Extract deps"));
        assert!(rendered.contains("done"));
        assert!(rendered.contains(&format!("{}...", "x".repeat(57))));
        assert!(!rendered.contains(&"x".repeat(58)));
    }
}
