//! Access state machine

use chrono::{DateTime, Utc};
use pcgate_api::{AccessMode, BlockReason, Expiry, OverlayCommand, StatusSnapshot, Verdict};
use std::time::Duration;
use tracing::{debug, error, info};

/// Evaluate one snapshot at one instant.
///
/// Any doubt resolves to `Block`. A deadline equal to `now` has expired.
pub fn evaluate(snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Verdict {
    if !snapshot.found {
        return Verdict::Block {
            reason: BlockReason::NotFound,
        };
    }

    if !snapshot.occupied {
        return Verdict::Block {
            reason: BlockReason::NotOccupied,
        };
    }

    match &snapshot.expiry {
        Expiry::Missing => Verdict::Block {
            reason: BlockReason::NoExpiry,
        },
        Expiry::Unparseable(raw) => {
            error!(value = %raw, "Unparseable session deadline, blocking");
            Verdict::Block {
                reason: BlockReason::MalformedExpiry,
            }
        }
        Expiry::At(deadline) => match pcgate_util::remaining_until(*deadline, now).to_std() {
            Ok(remaining) if !remaining.is_zero() => Verdict::Grant { remaining },
            _ => Verdict::Block {
                reason: BlockReason::Expired,
            },
        },
    }
}

/// State owned by the machine, mutated only by its own methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineState {
    pub mode: AccessMode,
    /// Whether the blocking overlay is known to be on screen
    pub overlay_visible: bool,
    pub pending_hide_deadline: Option<DateTime<Utc>>,
}

impl Default for MachineState {
    /// Blocking, with the overlay not yet confirmed on screen, so the first
    /// decision always brings it up.
    fn default() -> Self {
        Self {
            mode: AccessMode::Blocking,
            overlay_visible: false,
            pending_hide_deadline: None,
        }
    }
}

/// Request to run the deferred hide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HideRequest {
    pub delay: Duration,
    pub deadline: DateTime<Utc>,
}

/// Output of one decision step
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    /// `(from, to)` when the enforced mode changed
    pub transition: Option<(AccessMode, AccessMode)>,
    /// Commands for the display, in order
    pub commands: Vec<OverlayCommand>,
    pub schedule_hide: Option<HideRequest>,
    /// An outstanding deferred hide must be cancelled
    pub cancel_pending_hide: bool,
    /// Ask the authority to create the record
    pub register: bool,
}

impl Decision {
    fn idle(verdict: Verdict) -> Self {
        Self {
            verdict,
            transition: None,
            commands: Vec::new(),
            schedule_hide: None,
            cancel_pending_hide: false,
            register: false,
        }
    }
}

/// The decision core.
///
/// Transitions are edge-triggered: a command is produced only when the
/// decided mode differs from the effective one, or when the overlay is known
/// to have left the screen while blocking.
#[derive(Debug)]
pub struct AccessStateMachine {
    state: MachineState,
    grace_period: Duration,
    transient_message: String,
}

impl AccessStateMachine {
    pub fn new(grace_period: Duration, transient_message: impl Into<String>) -> Self {
        Self {
            state: MachineState::default(),
            grace_period,
            transient_message: transient_message.into(),
        }
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn mode(&self) -> AccessMode {
        self.state.mode
    }

    /// Apply one snapshot
    pub fn decide(&mut self, snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Decision {
        let verdict = evaluate(snapshot, now);
        let from = self.state.mode;
        let to = verdict.mode();

        let mut decision = Decision::idle(verdict);
        decision.register = !snapshot.found;

        match (from, to) {
            (AccessMode::Blocking, AccessMode::Blocking) if self.state.overlay_visible => {
                debug!(verdict = ?verdict, "Still blocking");
            }
            (_, AccessMode::Blocking) => {
                decision.cancel_pending_hide = self.state.pending_hide_deadline.take().is_some();
                decision.commands.push(OverlayCommand::Show);
                self.state.overlay_visible = true;
                self.state.mode = AccessMode::Blocking;
                if from != AccessMode::Blocking {
                    decision.transition = Some((from, to));
                }
                info!(from = %from, verdict = ?verdict, "Blocking access");
            }
            (AccessMode::Blocking, AccessMode::Granting) => {
                let deadline = now
                    + chrono::Duration::from_std(self.grace_period)
                        .unwrap_or_else(|_| chrono::Duration::zero());
                decision.commands.push(OverlayCommand::ShowTransientMessage {
                    text: self.transient_message.clone(),
                });
                decision.schedule_hide = Some(HideRequest {
                    delay: self.grace_period,
                    deadline,
                });
                decision.transition = Some((from, to));
                self.state.mode = AccessMode::Granting;
                self.state.pending_hide_deadline = Some(deadline);
                if let Verdict::Grant { remaining } = verdict {
                    info!(
                        remaining = %pcgate_util::format_duration(remaining),
                        hide_at = %deadline,
                        "Granting access after grace period"
                    );
                }
            }
            (AccessMode::Granting, AccessMode::Granting) => {
                debug!(verdict = ?verdict, "Still granting");
            }
        }

        decision
    }

    /// The deferred hide fired. Acts only if the machine is still granting
    /// with a hide outstanding.
    pub fn on_hide_due(&mut self) -> Vec<OverlayCommand> {
        if self.state.mode != AccessMode::Granting || self.state.pending_hide_deadline.is_none() {
            debug!(mode = %self.state.mode, "Deferred hide suppressed");
            return Vec::new();
        }

        self.state.pending_hide_deadline = None;
        self.state.overlay_visible = false;
        info!("Grace period over, hiding overlay");
        vec![OverlayCommand::Hide, OverlayCommand::Reset]
    }

    /// Record what the display reports about the overlay
    pub fn note_overlay_visibility(&mut self, visible: bool) {
        if self.state.overlay_visible != visible {
            debug!(visible, mode = %self.state.mode, "Overlay visibility reported");
        }
        self.state.overlay_visible = visible;
    }

    /// Commands that bring a freshly attached display to the current state.
    /// Replaying `Show` marks the overlay visible like any other `Show`.
    pub fn current_commands(&mut self) -> Vec<OverlayCommand> {
        match (self.state.mode, self.state.pending_hide_deadline) {
            (AccessMode::Blocking, _) => {
                self.state.overlay_visible = true;
                vec![OverlayCommand::Show]
            }
            (AccessMode::Granting, Some(_)) => vec![OverlayCommand::ShowTransientMessage {
                text: self.transient_message.clone(),
            }],
            (AccessMode::Granting, None) => vec![OverlayCommand::Hide, OverlayCommand::Reset],
        }
    }
}
