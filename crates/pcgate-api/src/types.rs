//! Shared types for the pcgate API

use chrono::{DateTime, Utc};
use pcgate_util::{DeviceId, ErrorTag};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The locally enforced mode. `Blocking` is the safe default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    #[default]
    Blocking,
    Granting,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Blocking => f.write_str("blocking"),
            AccessMode::Granting => f.write_str("granting"),
        }
    }
}

/// Authorization deadline as reported by the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expiry {
    /// No deadline on the record
    Missing,
    /// Parsed absolute deadline
    At(DateTime<Utc>),
    /// A value was present but could not be parsed
    Unparseable(String),
}

impl Expiry {
    /// Normalize the raw (nullable) field from the authority.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => Expiry::Missing,
            Some(s) if s.trim().is_empty() => Expiry::Missing,
            Some(s) => match pcgate_util::parse_timestamp(s) {
                Some(dt) => Expiry::At(dt),
                None => Expiry::Unparseable(s.to_string()),
            },
        }
    }
}

/// Normalized result of one remote status query.
///
/// When `found` is false the remaining fields carry no information and the
/// decision must treat the state as unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub found: bool,
    pub occupied: bool,
    pub expiry: Expiry,
    /// Classification of the failure that produced this snapshot, if any
    pub error: Option<ErrorTag>,
}

impl StatusSnapshot {
    /// The authority answered and holds no record for this device
    pub fn not_found() -> Self {
        Self {
            found: false,
            occupied: false,
            expiry: Expiry::Missing,
            error: None,
        }
    }

    /// The query failed; state is unknown
    pub fn unknown(tag: ErrorTag) -> Self {
        Self {
            error: Some(tag),
            ..Self::not_found()
        }
    }

    /// A record exists but is not in use
    pub fn available() -> Self {
        Self {
            found: true,
            occupied: false,
            expiry: Expiry::Missing,
            error: None,
        }
    }

    /// A record exists and is in use with the given deadline
    pub fn occupied(expiry: Expiry) -> Self {
        Self {
            found: true,
            occupied: true,
            expiry,
            error: None,
        }
    }
}

/// Why the decision core blocked access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// No record, or the query failed
    NotFound,
    /// Record present but not marked in use
    NotOccupied,
    /// In use without a deadline
    NoExpiry,
    /// Deadline reached
    Expired,
    /// Deadline present but unparseable
    MalformedExpiry,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockReason::NotFound => "not found",
            BlockReason::NotOccupied => "not occupied",
            BlockReason::NoExpiry => "no expiry",
            BlockReason::Expired => "expired",
            BlockReason::MalformedExpiry => "malformed expiry",
        };
        f.write_str(s)
    }
}

/// Outcome of evaluating one snapshot at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Grant { remaining: Duration },
    Block { reason: BlockReason },
}

impl Verdict {
    pub fn mode(&self) -> AccessMode {
        match self {
            Verdict::Grant { .. } => AccessMode::Granting,
            Verdict::Block { .. } => AccessMode::Blocking,
        }
    }
}

/// Command for the display collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayCommand {
    /// Bring the blocking screen to the foreground, fullscreen, with fresh content
    Show,
    /// Keep the overlay up but replace its content with a short message
    ShowTransientMessage { text: String },
    /// Reveal the desktop
    Hide,
    /// Restore the default content selection for the next show
    Reset,
}

/// Agent state as reported to IPC clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStateSnapshot {
    pub api_version: u32,
    pub device_id: DeviceId,
    pub mode: AccessMode,
    pub overlay_visible: bool,
    pub pending_hide_deadline: Option<DateTime<Utc>>,
    pub last_snapshot: Option<StatusSnapshot>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorTag>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expiry_parse_variants() {
        assert_eq!(Expiry::parse(None), Expiry::Missing);
        assert_eq!(Expiry::parse(Some("  ")), Expiry::Missing);
        assert_eq!(
            Expiry::parse(Some("2025-01-01T00:10:00Z")),
            Expiry::At(Utc.with_ymd_and_hms(2025, 1, 1, 0, 10, 0).unwrap())
        );
        assert_eq!(
            Expiry::parse(Some("not-a-date")),
            Expiry::Unparseable("not-a-date".into())
        );
    }

    #[test]
    fn default_mode_is_blocking() {
        assert_eq!(AccessMode::default(), AccessMode::Blocking);
    }

    #[test]
    fn overlay_command_serialization() {
        let cmd = OverlayCommand::ShowTransientMessage { text: "wait".into() };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"show_transient_message","text":"wait"}"#);
        let parsed: OverlayCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cmd);
    }
}
