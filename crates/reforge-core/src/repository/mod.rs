//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (reforge-infra) implements. In-memory implementations live alongside
//! them for embedding and tests.

pub mod plan;
pub mod record;

pub use plan::{InMemoryPlanStore, PlanStore};
pub use record::{InMemoryRunRecordStore, RecordError, RunRecordStore};
