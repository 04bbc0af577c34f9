//! Channel-backed human input.
//!
//! `ChannelHumanInput` is a human-input capability whose decisions arrive
//! through a `tokio::sync::mpsc` channel. The paired `HumanInputHandle` is
//! what a UI (or a test) uses to answer the gate.

use std::time::Duration;

use tokio::sync::{Mutex, mpsc};

use reforge_types::error::CapabilityError;
use reforge_types::task::{CapabilityKind, TaskResult};

use super::input::{TaskInput, TaskRequest};
use super::provider::CapabilityProvider;

/// Human-input provider that waits for a decision on an mpsc channel.
pub struct ChannelHumanInput {
    name: String,
    receiver: Mutex<mpsc::Receiver<String>>,
    timeout: Option<Duration>,
    prompts: Option<mpsc::UnboundedSender<String>>,
}

/// Sending half of a [`ChannelHumanInput`].
#[derive(Debug, Clone)]
pub struct HumanInputHandle {
    sender: mpsc::Sender<String>,
}

impl HumanInputHandle {
    /// Deliver one decision string to the gate.
    pub async fn decide(&self, decision: impl Into<String>) -> Result<(), CapabilityError> {
        self.sender
            .send(decision.into())
            .await
            .map_err(|_| CapabilityError::failed("human", "human input gate was dropped"))
    }

    /// Blocking variant of [`decide`](Self::decide) for reader threads
    /// outside the runtime.
    pub fn decide_blocking(&self, decision: impl Into<String>) -> Result<(), CapabilityError> {
        self.sender
            .blocking_send(decision.into())
            .map_err(|_| CapabilityError::failed("human", "human input gate was dropped"))
    }
}

impl ChannelHumanInput {
    /// Create the provider and its handle. `buffer` decisions may be queued ahead.
    pub fn new(name: impl Into<String>, buffer: usize) -> (Self, HumanInputHandle) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let provider = Self {
            name: name.into(),
            receiver: Mutex::new(receiver),
            timeout: None,
            prompts: None,
        };
        (provider, HumanInputHandle { sender })
    }

    /// Bound how long the gate waits for a decision.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Forward each resolved gate prompt to `sink` before waiting.
    pub fn with_prompt_sink(mut self, sink: mpsc::UnboundedSender<String>) -> Self {
        self.prompts = Some(sink);
        self
    }
}

impl CapabilityProvider for ChannelHumanInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::HumanInput
    }

    async fn invoke(&self, input: &TaskInput) -> Result<TaskResult, CapabilityError> {
        if let (Some(sink), TaskRequest::HumanGate { prompt }) = (&self.prompts, &input.request) {
            let _ = sink.send(prompt.clone());
        }

        tracing::info!(
            task_id = %input.task_id,
            step_id = %input.step.id,
            "human gate waiting for decision"
        );

        let mut receiver = self.receiver.lock().await;
        let received = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, receiver.recv())
                .await
                .map_err(|_| CapabilityError::TimedOut {
                    capability: self.name.clone(),
                    secs: limit.as_secs(),
                })?,
            None => receiver.recv().await,
        };

        let decision = received.ok_or_else(|| CapabilityError::InputClosed {
            capability: self.name.clone(),
        })?;
        Ok(TaskResult::success(
            serde_json::json!({ "decision": decision }),
            decision,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use reforge_types::plan::PlanStep;

    use super::*;

    fn gate_input() -> TaskInput {
        TaskInput {
            task_id: "gate".to_string(),
            step: PlanStep::new("s1", "First"),
            feedback: None,
            working_dir: PathBuf::from("/tmp/work"),
            request: TaskRequest::HumanGate {
                prompt: "Approve s1?".to_string(),
            },
            inputs: BTreeMap::new(),
            upstream: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_decision_is_returned_verbatim() {
        let (gate, handle) = ChannelHumanInput::new("human", 1);
        handle.decide("retry_with_feedback:fix X").await.unwrap();

        let result = gate.invoke(&gate_input()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.raw_text, "retry_with_feedback:fix X");
        assert_eq!(result.payload["decision"], "retry_with_feedback:fix X");
    }

    #[tokio::test]
    async fn test_closed_channel_is_capability_error() {
        let (gate, handle) = ChannelHumanInput::new("human", 1);
        drop(handle);

        let err = gate.invoke(&gate_input()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::InputClosed { .. }));
    }

    #[tokio::test]
    async fn test_timeout_expires_as_capability_error() {
        let (gate, _handle) = ChannelHumanInput::new("human", 1);
        let gate = gate.with_timeout(Duration::from_millis(20));

        let err = gate.invoke(&gate_input()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_prompt_is_forwarded_to_sink() {
        let (sink, mut prompts) = mpsc::unbounded_channel();
        let (gate, handle) = ChannelHumanInput::new("human", 1);
        let gate = gate.with_prompt_sink(sink);
        handle.decide("approve").await.unwrap();

        gate.invoke(&gate_input()).await.unwrap();
        assert_eq!(prompts.recv().await.unwrap(), "Approve s1?");
    }
}
