//! Error taxonomy for pcgate

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failure, attached to snapshots and logs.
///
/// Only `Unreachable` during startup is allowed to end the process. Every
/// other class degrades to the blocking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    /// Authority cannot be contacted at all
    Unreachable,
    /// Per-poll network, timeout or status failure
    Transient,
    /// Record present but fields missing or unparseable
    MalformedData,
    /// Bad operator input
    Misuse,
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorTag::Unreachable => "unreachable",
            ErrorTag::Transient => "transient",
            ErrorTag::MalformedData => "malformed_data",
            ErrorTag::Misuse => "misuse",
        };
        f.write_str(s)
    }
}

/// Errors that end the process before the agent starts
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Authority unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid usage: {0}")]
    Misuse(String),
}

impl GateError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn misuse(msg: impl Into<String>) -> Self {
        Self::Misuse(msg.into())
    }

    pub fn tag(&self) -> ErrorTag {
        match self {
            GateError::Unreachable(_) => ErrorTag::Unreachable,
            GateError::Misuse(_) => ErrorTag::Misuse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_variants() {
        assert_eq!(GateError::unreachable("x").tag(), ErrorTag::Unreachable);
        assert_eq!(GateError::misuse("x").tag(), ErrorTag::Misuse);
    }

    #[test]
    fn tag_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorTag::MalformedData).unwrap();
        assert_eq!(json, "\"malformed_data\"");
        assert_eq!(ErrorTag::MalformedData.to_string(), "malformed_data");
    }
}
