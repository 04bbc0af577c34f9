use std::path::PathBuf;

use thiserror::Error;

/// Errors from plan store operations.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("step '{0}' not found in plan")]
    NotFound(String),

    #[error("plan storage error: {0}")]
    Storage(String),
}

/// Errors raised by a capability provider while executing one task.
///
/// These are the only errors the engine recovers from: the failing task gets
/// an error result and the step is sent back for another attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("capability '{0}' is not registered")]
    NotRegistered(String),

    #[error("capability '{capability}' failed: {message}")]
    Failed { capability: String, message: String },

    #[error("capability '{capability}' timed out after {secs}s")]
    TimedOut { capability: String, secs: u64 },

    #[error("capability '{capability}' has no decision source (input closed)")]
    InputClosed { capability: String },
}

impl CapabilityError {
    pub fn failed(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            capability: capability.into(),
            message: message.into(),
        }
    }
}

/// A human gate produced a decision outside the accepted vocabulary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized decision '{0}' (expected approve, reject or retry_with_feedback:<text>)")]
pub struct ProtocolError(pub String);

/// Errors detected while loading configuration or pipeline definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{what} not found at {}", path.display())]
    Missing { what: &'static str, path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
