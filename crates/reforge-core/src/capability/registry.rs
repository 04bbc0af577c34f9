//! Capability registry for runtime provider lookup.

use std::collections::HashMap;

use super::box_provider::BoxCapabilityProvider;

/// Registry of available capability providers, indexed by name.
///
/// Fixed once the engine starts: delegation picks among registered
/// providers but never adds new ones.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    providers: HashMap<String, BoxCapabilityProvider>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name, replacing any previous one.
    pub fn register(&mut self, provider: BoxCapabilityProvider) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Builder-style `register`.
    pub fn with(mut self, provider: BoxCapabilityProvider) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoxCapabilityProvider> {
        self.providers.get(name)
    }

    /// Registered names, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
