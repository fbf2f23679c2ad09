//! Event types for pcgated -> client streaming

use chrono::{DateTime, Utc};
use pcgate_util::ErrorTag;
use serde::{Deserialize, Serialize};

use crate::{AccessMode, OverlayCommand, Verdict, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: pcgate_util::now(),
            payload,
        }
    }
}

/// All possible events from the agent to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// The display should act on this command
    Overlay {
        command: OverlayCommand,
        /// Page the display loads while blocking
        content_url: String,
    },

    /// The enforced mode changed
    ModeChanged {
        from: AccessMode,
        to: AccessMode,
        verdict: Verdict,
    },

    /// A poll or registration against the authority failed
    AuthorityError { tag: ErrorTag, message: String },

    /// Agent is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockReason;

    #[test]
    fn overlay_event_serialization() {
        let event = Event::new(EventPayload::Overlay {
            command: OverlayCommand::Show,
            content_url: "http://localhost:3005/#/pc-overlay/4".into(),
        });

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.api_version, API_VERSION);
        match parsed.payload {
            EventPayload::Overlay { command, content_url } => {
                assert_eq!(command, OverlayCommand::Show);
                assert!(content_url.ends_with("/4"));
            }
            other => panic!("Expected Overlay, got {:?}", other),
        }
    }

    #[test]
    fn mode_changed_serialization() {
        let event = Event::new(EventPayload::ModeChanged {
            from: AccessMode::Granting,
            to: AccessMode::Blocking,
            verdict: Verdict::Block {
                reason: BlockReason::Expired,
            },
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"mode_changed\""));
        assert!(json.contains("\"expired\""));
    }
}
