//! The migration engine: the plan-level state machine.

pub mod driver;
pub mod factory;

pub use driver::{EngineError, EngineOptions, EngineOutcome, HaltReason, MigrationEngine, StepOutcome};
pub use factory::GraphFactory;
