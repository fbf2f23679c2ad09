//! Core events emitted by the agent

use pcgate_api::{AccessMode, Verdict};
use pcgate_util::ErrorTag;

/// Events emitted by the agent loop for observers
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// The enforced mode changed
    ModeChanged {
        from: AccessMode,
        to: AccessMode,
        verdict: Verdict,
    },

    /// A poll came back without a usable record
    PollFailed { tag: ErrorTag },

    /// Best-effort registration was rejected or could not be sent
    RegistrationFailed { message: String },

    /// The agent loop has stopped and all timers are gone
    Stopped,
}
