//! BoxCapabilityProvider -- object-safe dynamic dispatch wrapper for CapabilityProvider.
//!
//! 1. `CapabilityProviderDyn` is the object-safe trait with boxed futures
//! 2. Blanket-impl `CapabilityProviderDyn` for all `T: CapabilityProvider`
//! 3. `BoxCapabilityProvider` wraps `Arc<dyn CapabilityProviderDyn>` and delegates

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reforge_types::error::CapabilityError;
use reforge_types::task::{CapabilityKind, TaskResult};

use super::input::TaskInput;
use super::provider::CapabilityProvider;

/// Object-safe version of [`CapabilityProvider`] with boxed futures.
pub trait CapabilityProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> CapabilityKind;

    fn invoke_boxed<'a>(
        &'a self,
        input: &'a TaskInput,
    ) -> Pin<Box<dyn Future<Output = Result<TaskResult, CapabilityError>> + Send + 'a>>;
}

impl<T: CapabilityProvider> CapabilityProviderDyn for T {
    fn name(&self) -> &str {
        CapabilityProvider::name(self)
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityProvider::kind(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        input: &'a TaskInput,
    ) -> Pin<Box<dyn Future<Output = Result<TaskResult, CapabilityError>> + Send + 'a>> {
        Box::pin(self.invoke(input))
    }
}

/// Type-erased capability provider for runtime selection.
///
/// Cheap to clone: clones share the same provider, which lets the
/// hierarchical coordinator move a handle into each spawned worker.
#[derive(Clone)]
pub struct BoxCapabilityProvider {
    inner: Arc<dyn CapabilityProviderDyn>,
}

impl BoxCapabilityProvider {
    /// Wrap a concrete `CapabilityProvider` in a type-erased handle.
    pub fn new<T: CapabilityProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Arc::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn kind(&self) -> CapabilityKind {
        self.inner.kind()
    }

    pub async fn invoke(&self, input: &TaskInput) -> Result<TaskResult, CapabilityError> {
        self.inner.invoke_boxed(input).await
    }
}

impl std::fmt::Debug for BoxCapabilityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxCapabilityProvider")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}
