//! CapabilityProvider trait definition.
//!
//! Every external worker (reasoning model, deterministic tool, human input)
//! implements this trait. Implementations that have side effects on the
//! working directory must say so in their docs; the engine never detects or
//! undoes them.

use reforge_types::error::CapabilityError;
use reforge_types::task::{CapabilityKind, TaskResult};

use super::input::TaskInput;

/// Trait for capability backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Providers
/// receive all of their configuration at construction time.
///
/// Implementations live in reforge-infra (command tools, OpenAI-compatible
/// reasoning) and reforge-api (terminal human gate).
pub trait CapabilityProvider: Send + Sync {
    /// Name the provider is registered under.
    fn name(&self) -> &str;

    /// Which task kinds this provider can serve.
    fn kind(&self) -> CapabilityKind;

    /// Execute one task. A returned `Err` becomes the task's error result.
    fn invoke(
        &self,
        input: &TaskInput,
    ) -> impl std::future::Future<Output = Result<TaskResult, CapabilityError>> + Send;
}
