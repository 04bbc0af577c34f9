//! Per-step task graphs and their execution.
//!
//! A `TaskGraph` is validated once at construction; the `Coordinator` then
//! runs it under its policy, handing each task to a `Worker`.

pub mod context;
pub mod coordinator;
pub mod dag;
pub mod delegation;
pub mod worker;

pub use context::{GraphContext, ResultStore};
pub use coordinator::{Coordinator, DecisionSource, GraphOutcome, Verdict};
pub use dag::{GraphError, GraphPolicy, HierarchicalPolicy, TaskGraph};
pub use delegation::{DelegationTable, ManagerSpec};
pub use worker::Worker;
