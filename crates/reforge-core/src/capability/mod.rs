//! Capability providers: the external workers a task delegates to.

pub mod box_provider;
pub mod human;
pub mod input;
pub mod provider;
pub mod registry;

pub use box_provider::BoxCapabilityProvider;
pub use human::{ChannelHumanInput, HumanInputHandle};
pub use input::{TaskInput, TaskRequest};
pub use provider::CapabilityProvider;
pub use registry::CapabilityRegistry;
