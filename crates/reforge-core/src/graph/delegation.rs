//! Hierarchical delegation.
//!
//! The manager of a hierarchical graph picks a provider for each ready task
//! from a fixed lookup table. It may choose among registered providers but
//! never changes which tasks exist or how they depend on each other.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use reforge_types::task::TaskNode;

use crate::capability::{BoxCapabilityProvider, CapabilityRegistry};

use super::dag::GraphError;

/// Capability name -> ordered candidate provider names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegationTable {
    routes: BTreeMap<String, Vec<String>>,
}

impl DelegationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        mut self,
        capability: impl Into<String>,
        candidates: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.routes.insert(
            capability.into(),
            candidates.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn candidates(&self, capability: &str) -> &[String] {
        self.routes
            .get(capability)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl From<BTreeMap<String, Vec<String>>> for DelegationTable {
    fn from(routes: BTreeMap<String, Vec<String>>) -> Self {
        Self { routes }
    }
}

/// The designated manager of a hierarchical graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSpec {
    /// Reasoning capability that turns the supervised results into the
    /// graph's decision when no human gate is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesizer: Option<String>,
    /// Instruction given to the synthesizer; a default is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default)]
    pub delegation: DelegationTable,
}

pub const DEFAULT_SYNTHESIS_INSTRUCTION: &str = "You supervise the tasks of migration step \
'{{ step.id }}' ({{ step.name }}). Review their results and answer with exactly one line: \
'approve', 'reject', or 'retry_with_feedback:<what must change>'.";

impl ManagerSpec {
    /// Pick the provider for `node`.
    ///
    /// The first registered candidate of the right kind wins; without one the
    /// task's own capability is used.
    pub fn assign(
        &self,
        node: &TaskNode,
        registry: &CapabilityRegistry,
    ) -> Result<BoxCapabilityProvider, GraphError> {
        let capability = node.kind.capability();
        let wanted = node.kind.capability_kind();

        let delegated = self
            .delegation
            .candidates(capability)
            .iter()
            .filter_map(|name| registry.get(name))
            .find(|provider| provider.kind() == wanted);
        if let Some(provider) = delegated {
            return Ok(provider.clone());
        }

        bind_direct(node, registry)
    }
}

/// Bind `node` to the provider registered under its own capability name.
pub fn bind_direct(
    node: &TaskNode,
    registry: &CapabilityRegistry,
) -> Result<BoxCapabilityProvider, GraphError> {
    let capability = node.kind.capability();
    let provider = registry
        .get(capability)
        .ok_or_else(|| GraphError::UnknownCapability {
            task: node.id.clone(),
            capability: capability.to_string(),
        })?;

    let wanted = node.kind.capability_kind();
    if provider.kind() != wanted {
        return Err(GraphError::CapabilityKindMismatch {
            task: node.id.clone(),
            capability: capability.to_string(),
            expected: wanted,
            actual: provider.kind(),
        });
    }
    Ok(provider.clone())
}
