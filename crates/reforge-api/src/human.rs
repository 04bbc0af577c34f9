//! Terminal human gate.
//!
//! Prints the gate prompt with a short summary of every upstream result,
//! then waits for one decision line. Lines come from a single long-lived
//! reader thread feeding a [`ChannelHumanInput`], so a read left open by a
//! timed-out gate answers the next gate instead of being lost.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use console::style;
use dialoguer::Input;

use reforge_core::capability::{
    CapabilityProvider, ChannelHumanInput, HumanInputHandle, TaskInput, TaskRequest,
};
use reforge_types::error::CapabilityError;
use reforge_types::task::{CapabilityKind, TaskResult};

/// Longest upstream excerpt shown above the prompt.
const SUMMARY_CHARS: usize = 400;

const DECISION_PROMPT: &str = "approve | reject | retry_with_feedback:<text>";

pub struct TerminalHumanInput {
    gate: ChannelHumanInput,
    reader: LineReader,
    requires_terminal: bool,
}

impl TerminalHumanInput {
    pub fn new(name: impl Into<String>) -> Self {
        let mut input = Self::with_source(name, || {
            Input::<String>::new()
                .with_prompt(DECISION_PROMPT)
                .interact_text()
                .map_err(io::Error::other)
        });
        input.requires_terminal = true;
        input
    }

    /// Gate fed by an arbitrary blocking line source.
    pub fn with_source<F>(name: impl Into<String>, read: F) -> Self
    where
        F: FnMut() -> io::Result<String> + Send + 'static,
    {
        let (gate, handle) = ChannelHumanInput::new(name, 1);
        Self {
            gate,
            reader: LineReader::spawn(read, handle),
            requires_terminal: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.gate = self.gate.with_timeout(timeout);
        self
    }
}

/// Owns the reader thread. At most one read is outstanding at a time; it
/// stays open until some gate consumes its line.
struct LineReader {
    requests: mpsc::Sender<()>,
    in_flight: AtomicBool,
}

impl LineReader {
    fn spawn<F>(mut read: F, handle: HumanInputHandle) -> Self
    where
        F: FnMut() -> io::Result<String> + Send + 'static,
    {
        let (requests, pending) = mpsc::channel::<()>();
        std::thread::spawn(move || {
            while pending.recv().is_ok() {
                match read() {
                    Ok(line) => {
                        if handle.decide_blocking(line).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "terminal input closed");
                        break;
                    }
                }
            }
        });
        Self {
            requests,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Ask for a line unless a read is already open. Returns `false` once
    /// the reader thread has stopped.
    fn request(&self) -> bool {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return true;
        }
        self.requests.send(()).is_ok()
    }

    fn is_reading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// A gate took the line produced by the open read.
    fn consumed(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Gate header, step line and one block per upstream task.
fn render_gate(input: &TaskInput, prompt: &str) -> String {
    let mut out = format!(
        "\n  {} {}\n  step {} ({})",
        style("⏸").bold(),
        style(prompt).cyan().bold(),
        style(&input.step.id).yellow(),
        input.step.name
    );
    if let Some(feedback) = &input.feedback {
        out.push_str(&format!("\n  previous feedback: {}", style(feedback).dim()));
    }
    for (task_id, result) in &input.upstream {
        let marker = if result.is_success() {
            style("✓").green()
        } else {
            style("✗").red()
        };
        out.push_str(&format!(
            "\n\n  {marker} {}\n{}",
            style(task_id).bold(),
            indent(&excerpt(&result.raw_text, SUMMARY_CHARS))
        ));
    }
    out.push('\n');
    out
}

/// The last `max_chars` characters of `text`, prefixed with an ellipsis
/// when shortened.
fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim_end();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - max_chars).collect();
    format!("…{tail}")
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl CapabilityProvider for TerminalHumanInput {
    fn name(&self) -> &str {
        self.gate.name()
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::HumanInput
    }

    async fn invoke(&self, input: &TaskInput) -> Result<TaskResult, CapabilityError> {
        let prompt = match &input.request {
            TaskRequest::HumanGate { prompt } => prompt.clone(),
            _ => {
                return Err(CapabilityError::failed(
                    self.name(),
                    "human gate received a non-gate request",
                ));
            }
        };

        if self.requires_terminal && !console::user_attended() {
            return Err(CapabilityError::InputClosed {
                capability: self.name().to_string(),
            });
        }

        eprintln!("{}", render_gate(input, &prompt));
        if self.reader.is_reading() {
            eprintln!("  {}", style(format!("answer at the open prompt: {DECISION_PROMPT}")).dim());
        }
        if !self.reader.request() {
            return Err(CapabilityError::InputClosed {
                capability: self.name().to_string(),
            });
        }

        let answered = self.gate.invoke(input).await;
        if answered.is_ok() {
            self.reader.consumed();
        }
        answered
    }
}
