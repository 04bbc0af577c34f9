//! JSON file plan store.
//!
//! The plan document is a bare JSON array of step records. Reads recover from
//! a malformed document by treating it as an empty plan; writes replace the
//! file atomically and never touch it when the update is rejected.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use reforge_core::repository::PlanStore;
use reforge_types::error::PlanError;
use reforge_types::plan::{Plan, StepStatus};

use crate::fs::write_atomic;

/// Plan store over a JSON document on disk.
///
/// A mutex serializes load-modify-save cycles within the process. The engine
/// is the only writer of the document while it runs.
#[derive(Debug)]
pub struct JsonPlanStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonPlanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_plan(&self) -> Result<Plan, PlanError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No plan document at {}, using an empty plan", self.path.display());
                return Ok(Plan::default());
            }
            Err(err) => {
                return Err(PlanError::Storage(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                )));
            }
        };

        let plan = match serde_json::from_str::<Plan>(&content) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(
                    "Malformed plan document {}: {err}, using an empty plan",
                    self.path.display()
                );
                return Ok(Plan::default());
            }
        };

        if let Some(id) = plan.duplicate_id() {
            tracing::warn!(
                "Plan document {} repeats step id '{id}', using an empty plan",
                self.path.display()
            );
            return Ok(Plan::default());
        }
        Ok(plan)
    }
}

impl PlanStore for JsonPlanStore {
    async fn load(&self) -> Result<Plan, PlanError> {
        let _guard = self.lock.lock().await;
        self.read_plan().await
    }

    async fn update_status(
        &self,
        id: &str,
        status: StepStatus,
        notes: Option<&str>,
    ) -> Result<(), PlanError> {
        let _guard = self.lock.lock().await;
        let mut plan = self.read_plan().await?;
        plan.update_status(id, status, notes)?;

        let mut bytes = serde_json::to_vec_pretty(&plan)
            .map_err(|e| PlanError::Storage(format!("failed to serialize plan: {e}")))?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes).await.map_err(|e| {
            PlanError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })?;

        tracing::debug!(step_id = %id, status = %status, "plan step updated");
        Ok(())
    }
}
