//! `reforge validate`: startup checks without running any step.

use std::collections::BTreeSet;

use anyhow::Result;
use console::style;

use reforge_core::graph::GraphPolicy;
use reforge_core::repository::PlanStore;
use reforge_infra::config::validate_config;
use reforge_infra::pipeline::{GraphDefinition, PipelineDefinition};

use crate::state::AppState;

pub async fn validate(state: &AppState, json: bool) -> Result<()> {
    validate_config(&state.config).await?;

    let pipeline = state.pipeline().await?;
    pipeline.validate()?;
    let unknown = unknown_capabilities(&pipeline, &state.capability_names());
    if !unknown.is_empty() {
        anyhow::bail!(
            "pipeline references unconfigured capabilities: {}",
            unknown.into_iter().collect::<Vec<_>>().join(", ")
        );
    }

    let plan = state.plan_store().load().await?;
    let missing_keys: Vec<&str> = state
        .config
        .reasoning
        .values()
        .map(|r| r.api_key_env.as_str())
        .filter(|var| std::env::var_os(var).is_none())
        .collect();

    if json {
        let out = serde_json::json!({
            "valid": true,
            "config": state.config_path,
            "steps": plan.steps.len(),
            "next_step": plan.next_todo().map(|s| s.id.clone()),
            "missing_api_keys": missing_keys,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} is valid",
        style("✓").green().bold(),
        style(state.config_path.display()).cyan()
    );
    println!(
        "  {} plan step{}, next: {}",
        plan.steps.len(),
        if plan.steps.len() == 1 { "" } else { "s" },
        plan.next_todo().map(|s| s.id.as_str()).unwrap_or("none")
    );
    for var in missing_keys {
        println!(
            "  {} environment variable {} is not set",
            style("!").yellow().bold(),
            style(var).yellow()
        );
    }
    println!();
    Ok(())
}

/// Capability names the pipeline uses that the configuration does not provide.
///
/// Delegation candidates may be missing (the manager falls back), task
/// capabilities and synthesizers may not.
fn unknown_capabilities(
    pipeline: &PipelineDefinition,
    configured: &BTreeSet<String>,
) -> BTreeSet<String> {
    let graphs = std::iter::once(&pipeline.default).chain(pipeline.steps.values());
    let mut unknown = BTreeSet::new();
    for def in graphs {
        for name in referenced(def) {
            if !configured.contains(&name) {
                unknown.insert(name);
            }
        }
    }
    unknown
}

fn referenced(def: &GraphDefinition) -> Vec<String> {
    let mut names: Vec<String> = def
        .tasks
        .iter()
        .map(|t| t.kind.capability().to_string())
        .collect();
    if let Ok(graph) = def.build_graph() {
        if let GraphPolicy::Hierarchical(policy) = graph.policy() {
            names.extend(policy.manager.synthesizer.clone());
        }
    }
    names
}
