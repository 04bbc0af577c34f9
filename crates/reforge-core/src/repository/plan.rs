//! Plan store trait definition.
//!
//! The plan store exclusively owns the plan document. Every mutation is a full
//! load-modify-save cycle and callers never observe a partial write.

use tokio::sync::Mutex;

use reforge_types::error::PlanError;
use reforge_types::plan::{Plan, PlanStep, StepStatus};

/// Storage interface for the migration plan.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait PlanStore: Send + Sync {
    /// Load the whole plan. A malformed document loads as an empty plan.
    fn load(&self) -> impl std::future::Future<Output = Result<Plan, PlanError>> + Send;

    /// Overwrite the status of step `id`, and its notes when `notes` is given.
    ///
    /// An unknown `id` fails with `PlanError::NotFound` and leaves the
    /// persisted document untouched.
    fn update_status(
        &self,
        id: &str,
        status: StepStatus,
        notes: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), PlanError>> + Send;

    /// First `todo` step in document order; `None` once the plan is exhausted.
    fn next_todo(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<PlanStep>, PlanError>> + Send {
        async move { Ok(self.load().await?.next_todo().cloned()) }
    }

    fn get(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<PlanStep>, PlanError>> + Send {
        async move { Ok(self.load().await?.get(id).cloned()) }
    }
}

/// Plan store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryPlanStore {
    plan: Mutex<Plan>,
}

impl InMemoryPlanStore {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan: Mutex::new(plan),
        }
    }

    /// Copy of the current plan.
    pub async fn snapshot(&self) -> Plan {
        self.plan.lock().await.clone()
    }
}

impl PlanStore for InMemoryPlanStore {
    async fn load(&self) -> Result<Plan, PlanError> {
        Ok(self.plan.lock().await.clone())
    }

    async fn update_status(
        &self,
        id: &str,
        status: StepStatus,
        notes: Option<&str>,
    ) -> Result<(), PlanError> {
        let mut plan = self.plan.lock().await;
        plan.update_status(id, status, notes)
    }
}
