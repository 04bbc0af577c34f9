//! Deterministic tool provider: named operations backed by external programs.
//!
//! Each operation is a program plus an argument list from config. Arguments
//! are templates resolved against the task input (`{{ args.<key> }}`,
//! `{{ working_dir }}`, `{{ step.id }}`, ...). The program runs in the step's
//! working copy; completion code 0 is success and anything else an error
//! result. Side effects are whatever the program does to the working copy.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::json;

use reforge_core::capability::{CapabilityProvider, TaskInput, TaskRequest};
use reforge_core::graph::context::render_template;
use reforge_types::config::{ToolConfig, ToolOperation};
use reforge_types::error::CapabilityError;
use reforge_types::task::{CapabilityKind, TaskResult, TaskStatus};

/// Runs configured external commands.
#[derive(Debug, Clone)]
pub struct CommandToolProvider {
    name: String,
    config: ToolConfig,
}

impl CommandToolProvider {
    pub fn new(name: impl Into<String>, config: ToolConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    fn operation(&self, operation: &str) -> Result<&ToolOperation, CapabilityError> {
        self.config.operations.get(operation).ok_or_else(|| {
            CapabilityError::failed(&self.name, format!("unknown operation '{operation}'"))
        })
    }
}

impl CapabilityProvider for CommandToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Tool
    }

    async fn invoke(&self, input: &TaskInput) -> Result<TaskResult, CapabilityError> {
        let TaskRequest::Tool { operation, .. } = &input.request else {
            return Err(CapabilityError::failed(
                &self.name,
                "tool provider received a non-tool request",
            ));
        };
        let op = self.operation(operation)?;
        let args: Vec<String> = op
            .args
            .iter()
            .map(|arg| render_template(arg, |expr| input.lookup(expr)))
            .collect();

        tracing::debug!(
            task_id = %input.task_id,
            program = %op.program,
            ?args,
            "running tool operation '{operation}'"
        );

        let start = Instant::now();
        let child = tokio::process::Command::new(&op.program)
            .args(&args)
            .current_dir(&input.working_dir)
            .env("REFORGE_STEP_ID", &input.step.id)
            .env("REFORGE_TASK_ID", &input.task_id)
            .env("REFORGE_FEEDBACK", input.feedback.as_deref().unwrap_or_default())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CapabilityError::failed(&self.name, format!("failed to spawn '{}': {e}", op.program))
            })?;

        let output = tokio::time::timeout(
            Duration::from_secs(op.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| CapabilityError::TimedOut {
            capability: self.name.clone(),
            secs: op.timeout_secs,
        })?
        .map_err(|e| {
            CapabilityError::failed(&self.name, format!("failed to wait for '{}': {e}", op.program))
        })?;

        let limit = self.config.max_output_bytes;
        let stdout = truncate_tail(&String::from_utf8_lossy(&output.stdout), limit).to_string();
        let stderr = truncate_tail(&String::from_utf8_lossy(&output.stderr), limit).to_string();
        let exit_code = output.status.code();
        let status = if output.status.success() {
            TaskStatus::Success
        } else {
            TaskStatus::Error
        };

        tracing::info!(
            task_id = %input.task_id,
            exit_code = ?exit_code,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool operation '{operation}' finished"
        );

        let raw_text = match status {
            TaskStatus::Success => stdout.clone(),
            TaskStatus::Error => format!(
                "'{}' exited with {}: {}",
                op.program,
                exit_code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")),
                if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() }
            ),
        };

        Ok(TaskResult {
            status,
            payload: json!({
                "operation": operation,
                "program": op.program,
                "args": args,
                "exit_code": exit_code,
                "stdout": stdout,
                "stderr": stderr,
            }),
            raw_text,
        })
    }
}

/// The last `max_bytes` of `text`, cut forward to a char boundary.
pub fn truncate_tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;

    use reforge_types::plan::PlanStep;
    use tempfile::TempDir;

    fn sh(script: &str) -> ToolOperation {
        ToolOperation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_secs: 5,
        }
    }

    fn provider(ops: Vec<(&str, ToolOperation)>, max_output_bytes: usize) -> CommandToolProvider {
        let operations = ops
            .into_iter()
            .map(|(name, op)| (name.to_string(), op))
            .collect();
        CommandToolProvider::new(
            "build",
            ToolConfig {
                max_output_bytes,
                operations,
            },
        )
    }

    fn input(dir: &Path, operation: &str, args: BTreeMap<String, serde_json::Value>) -> TaskInput {
        TaskInput {
            task_id: "compile".to_string(),
            step: PlanStep::new("s1", "Port parser"),
            feedback: None,
            working_dir: dir.to_path_buf(),
            request: TaskRequest::Tool {
                operation: operation.to_string(),
                args,
            },
            inputs: BTreeMap::new(),
            upstream: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_zero_exit_is_success_and_runs_in_working_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("A.txt"), "alpha").unwrap();
        let tool = provider(vec![("show", sh("cat A.txt"))], 2000);

        let result = tool.invoke(&input(tmp.path(), "show", BTreeMap::new())).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.raw_text, "alpha");
        assert_eq!(result.payload["exit_code"], 0);
        assert_eq!(result.payload["operation"], "show");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error_result_with_captured_output() {
        let tmp = TempDir::new().unwrap();
        let tool = provider(vec![("fail", sh("echo partial; echo broken >&2; exit 3"))], 2000);

        let result = tool.invoke(&input(tmp.path(), "fail", BTreeMap::new())).await.unwrap();

        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.payload["exit_code"], 3);
        assert_eq!(result.payload["stdout"], "partial\n");
        assert_eq!(result.payload["stderr"], "broken\n");
        assert!(result.raw_text.contains("code 3"));
        assert!(result.raw_text.contains("broken"));
    }

    #[tokio::test]
    async fn test_args_are_templated_from_task_args_and_step() {
        let tmp = TempDir::new().unwrap();
        let op = ToolOperation {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo \"$0 $1\"".to_string(),
                "{{ args.package }}".to_string(),
                "{{ step.id }}".to_string(),
            ],
            timeout_secs: 5,
        };
        let tool = provider(vec![("echo", op)], 2000);
        let mut args = BTreeMap::new();
        args.insert("package".to_string(), serde_json::json!("core"));

        let result = tool.invoke(&input(tmp.path(), "echo", args)).await.unwrap();

        assert_eq!(result.raw_text, "core s1\n");
        assert_eq!(result.payload["args"][2], "core");
    }

    #[tokio::test]
    async fn test_output_is_truncated_to_tail() {
        let tmp = TempDir::new().unwrap();
        let tool = provider(vec![("long", sh("printf 'abcdefghij'"))], 4);

        let result = tool.invoke(&input(tmp.path(), "long", BTreeMap::new())).await.unwrap();

        assert_eq!(result.payload["stdout"], "ghij");
    }

    #[tokio::test]
    async fn test_timeout_is_capability_error() {
        let tmp = TempDir::new().unwrap();
        let mut op = sh("sleep 5");
        op.timeout_secs = 0;
        let tool = provider(vec![("slow", op)], 2000);

        let err = tool
            .invoke(&input(tmp.path(), "slow", BTreeMap::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, CapabilityError::TimedOut { secs: 0, .. }));
    }

    #[tokio::test]
    async fn test_unknown_operation_and_missing_program_are_capability_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = ToolOperation {
            program: "reforge-no-such-program".to_string(),
            args: Vec::new(),
            timeout_secs: 5,
        };
        let tool = provider(vec![("gone", missing)], 2000);

        let err = tool
            .invoke(&input(tmp.path(), "nope", BTreeMap::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown operation 'nope'"));

        let err = tool
            .invoke(&input(tmp.path(), "gone", BTreeMap::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[test]
    fn test_truncate_tail_respects_char_boundaries() {
        assert_eq!(truncate_tail("short", 10), "short");
        assert_eq!(truncate_tail("abcdef", 3), "def");
        // "é" is two bytes; a cut through it moves forward.
        assert_eq!(truncate_tail("aéb", 3), "éb");
        assert_eq!(truncate_tail("aéb", 2), "b");
    }
}
