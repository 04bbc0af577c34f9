//! Graph execution context and template resolution.
//!
//! `GraphContext` carries what every task of one graph run shares: the plan
//! step, the feedback of the previous attempt and the working directory.
//! `ResultStore` accumulates task results, write-once per task id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use reforge_types::plan::PlanStep;
use reforge_types::task::TaskResult;

use super::dag::GraphError;

/// Shared, read-only context of one graph run.
#[derive(Debug, Clone)]
pub struct GraphContext {
    pub step: PlanStep,
    pub feedback: Option<String>,
    pub working_dir: PathBuf,
}

impl GraphContext {
    pub fn new(step: PlanStep, feedback: Option<String>, working_dir: PathBuf) -> Self {
        Self {
            step,
            feedback,
            working_dir,
        }
    }

    /// Resolve `{{ ... }}` references in `template`.
    ///
    /// Supported: `step.id`, `step.name`, `step.description`, `feedback`,
    /// `working_dir` and `tasks.<id>.raw_text` for results already recorded.
    /// Anything else is left verbatim.
    pub fn resolve_template(&self, template: &str, results: &ResultStore) -> String {
        render_template(template, |expr| {
            lookup_step_reference(expr, &self.step, self.feedback.as_deref(), &self.working_dir)
                .or_else(|| {
                    let (task, field) = expr.strip_prefix("tasks.")?.rsplit_once('.')?;
                    let result = results.get(task)?;
                    match field {
                        "raw_text" => Some(result.raw_text.clone()),
                        "payload" => Some(result.payload.to_string()),
                        _ => None,
                    }
                })
        })
    }
}

/// Replace every `{{ expr }}` for which `lookup` returns a value.
pub fn render_template(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + len + 2;
        out.push_str(&rest[..start]);
        match lookup(rest[start + 2..end - 2].trim()) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..end]),
        }
        rest = &rest[end..];
    }

    out.push_str(rest);
    out
}

/// Resolve the references every template may use.
pub fn lookup_step_reference(
    expr: &str,
    step: &PlanStep,
    feedback: Option<&str>,
    working_dir: &Path,
) -> Option<String> {
    match expr {
        "step.id" => Some(step.id.clone()),
        "step.name" => Some(step.name.clone()),
        "step.description" => Some(step.description.clone()),
        "step.notes" => Some(step.notes.clone()),
        "feedback" => Some(feedback.unwrap_or_default().to_string()),
        "working_dir" => Some(working_dir.display().to_string()),
        _ => None,
    }
}

/// Render a JSON value for interpolation: strings unquoted, everything else as JSON.
pub fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Result store
// ---------------------------------------------------------------------------

/// Task results of one graph run, in the order they were recorded.
#[derive(Debug, Default)]
pub struct ResultStore {
    results: HashMap<String, TaskResult>,
    order: Vec<String>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of `task_id`. A second write for the same id fails.
    pub fn insert(&mut self, task_id: &str, result: TaskResult) -> Result<(), GraphError> {
        if self.results.contains_key(task_id) {
            return Err(GraphError::DuplicateResult(task_id.to_string()));
        }
        self.results.insert(task_id.to_string(), result);
        self.order.push(task_id.to_string());
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.get(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.results.contains_key(task_id)
    }

    /// Task ids in recording order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Consume the store, yielding `(task_id, result)` pairs in recording order.
    pub fn into_ordered(mut self) -> Vec<(String, TaskResult)> {
        self.order
            .iter()
            .filter_map(|id| self.results.remove(id).map(|r| (id.clone(), r)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> GraphContext {
        let mut step = PlanStep::new("s1", "Port parser");
        step.description = "Move the parser".to_string();
        GraphContext::new(step, Some("fix X".to_string()), PathBuf::from("/work/s1"))
    }

    #[test]
    fn test_resolves_step_feedback_and_working_dir() {
        let ctx = context();
        let out = ctx.resolve_template(
            "{{ step.id }}/{{step.name}}: {{ step.description }} [{{ feedback }}] in {{ working_dir }}",
            &ResultStore::new(),
        );
        assert_eq!(out, "s1/Port parser: Move the parser [fix X] in /work/s1");
    }

    #[test]
    fn test_resolves_recorded_task_output() {
        let ctx = context();
        let mut results = ResultStore::new();
        results
            .insert("analyze", TaskResult::success(json!({}), "two modules"))
            .unwrap();
        let out = ctx.resolve_template("Analysis: {{ tasks.analyze.raw_text }}", &results);
        assert_eq!(out, "Analysis: two modules");
    }

    #[test]
    fn test_unknown_references_are_left_verbatim() {
        let ctx = context();
        let out = ctx.resolve_template(
            "{{ tasks.missing.raw_text }} and {{ nonsense }} and {{ unclosed",
            &ResultStore::new(),
        );
        assert_eq!(out, "{{ tasks.missing.raw_text }} and {{ nonsense }} and {{ unclosed");
    }

    #[test]
    fn test_missing_feedback_renders_empty() {
        let ctx = GraphContext::new(PlanStep::new("s1", "x"), None, PathBuf::from("/w"));
        assert_eq!(ctx.resolve_template("[{{ feedback }}]", &ResultStore::new()), "[]");
    }

    #[test]
    fn test_result_store_is_write_once() {
        let mut results = ResultStore::new();
        results.insert("a", TaskResult::error("first")).unwrap();
        let err = results.insert("a", TaskResult::error("second")).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateResult(id) if id == "a"));
        assert_eq!(results.get("a").unwrap().raw_text, "first");
    }

    #[test]
    fn test_result_store_keeps_recording_order() {
        let mut results = ResultStore::new();
        results.insert("b", TaskResult::error("b")).unwrap();
        results.insert("a", TaskResult::error("a")).unwrap();
        let ids: Vec<String> = results.into_ordered().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
