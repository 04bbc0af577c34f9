//! The human decision vocabulary.
//!
//! Every step attempt ends with exactly one decision string. Only three
//! shapes are accepted: `approve`, `reject` and `retry_with_feedback:<text>`.
//! Surrounding whitespace is ignored, keywords are case-sensitive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

pub const APPROVE: &str = "approve";
pub const REJECT: &str = "reject";
pub const RETRY_PREFIX: &str = "retry_with_feedback:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "feedback", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    RetryWithFeedback(String),
}

impl Decision {
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        match trimmed {
            APPROVE => Ok(Decision::Approve),
            REJECT => Ok(Decision::Reject),
            _ => trimmed
                .strip_prefix(RETRY_PREFIX)
                .map(|feedback| Decision::RetryWithFeedback(feedback.trim().to_string()))
                .ok_or_else(|| ProtocolError(raw.to_string())),
        }
    }
}

impl FromStr for Decision {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decision::parse(s)
    }
}

/// Renders the wire form accepted by `Decision::parse`.
impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Approve => f.write_str(APPROVE),
            Decision::Reject => f.write_str(REJECT),
            Decision::RetryWithFeedback(feedback) => write!(f, "{RETRY_PREFIX}{feedback}"),
        }
    }
}
