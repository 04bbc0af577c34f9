//! Scripted providers shared by the crate's unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reforge_types::error::CapabilityError;
use reforge_types::task::{CapabilityKind, TaskResult};

use crate::capability::{CapabilityProvider, TaskInput};

enum Reply {
    Text(String),
    Fail(String),
}

/// Provider answering from a per-task script and recording every input it sees.
pub struct ScriptedProvider {
    name: String,
    kind: CapabilityKind,
    replies: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
    seen: Arc<Mutex<Vec<TaskInput>>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, kind: CapabilityKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            replies: HashMap::new(),
            delays: HashMap::new(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn reply(mut self, task_id: &str, text: &str) -> Self {
        self.replies
            .insert(task_id.to_string(), Reply::Text(text.to_string()));
        self
    }

    pub fn fail(mut self, task_id: &str, message: &str) -> Self {
        self.replies
            .insert(task_id.to_string(), Reply::Fail(message.to_string()));
        self
    }

    pub fn delay(mut self, task_id: &str, delay: Duration) -> Self {
        self.delays.insert(task_id.to_string(), delay);
        self
    }

    /// Handle on the inputs this provider has received, in invocation order.
    pub fn seen(&self) -> Arc<Mutex<Vec<TaskInput>>> {
        Arc::clone(&self.seen)
    }
}

impl CapabilityProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CapabilityKind {
        self.kind
    }

    async fn invoke(&self, input: &TaskInput) -> Result<TaskResult, CapabilityError> {
        self.seen.lock().unwrap().push(input.clone());
        if let Some(delay) = self.delays.get(&input.task_id) {
            tokio::time::sleep(*delay).await;
        }
        match self.replies.get(&input.task_id) {
            Some(Reply::Text(text)) => Ok(TaskResult::success(
                serde_json::json!({ "provider": self.name, "text": text }),
                text.clone(),
            )),
            Some(Reply::Fail(message)) => Err(CapabilityError::failed(&self.name, message.clone())),
            None => Ok(TaskResult::success(
                serde_json::json!({ "provider": self.name }),
                format!("{}:{}", self.name, input.task_id),
            )),
        }
    }
}

/// Task ids of the inputs recorded in `seen`.
pub fn seen_task_ids(seen: &Arc<Mutex<Vec<TaskInput>>>) -> Vec<String> {
    seen.lock()
        .unwrap()
        .iter()
        .map(|input| input.task_id.clone())
        .collect()
}
