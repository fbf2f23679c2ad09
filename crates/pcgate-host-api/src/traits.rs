//! Collaborator traits

use async_trait::async_trait;
use pcgate_api::{OverlayCommand, StatusSnapshot};
use pcgate_util::{DeviceId, ErrorTag};
use thiserror::Error;

/// Errors from talking to the remote authority
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl AuthorityError {
    /// Classification of this failure when it happens during a poll
    pub fn tag(&self) -> ErrorTag {
        match self {
            AuthorityError::Decode(_) => ErrorTag::MalformedData,
            AuthorityError::Connect(_)
            | AuthorityError::Timeout
            | AuthorityError::Status { .. }
            | AuthorityError::Request(_) => ErrorTag::Transient,
        }
    }
}

pub type AuthorityResult<T> = Result<T, AuthorityError>;

/// Source of remote session state for one device
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch and normalize the current record.
    ///
    /// Never fails: every network or parse failure becomes a snapshot with
    /// `found = false` and the matching error tag.
    async fn fetch(&self, device_id: DeviceId) -> StatusSnapshot;

    /// Best-effort creation of the record; duplicates are tolerated.
    async fn register_if_absent(&self, device_id: DeviceId) -> AuthorityResult<()>;

    /// One-shot startup check that the authority can be contacted at all
    async fn verify_reachable(&self) -> AuthorityResult<()>;
}

/// Errors from the display collaborator
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("Display unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type OverlayResult<T> = Result<T, OverlayError>;

/// Display that draws the blocking overlay.
///
/// Commands are fire-and-forget: the decision core logs failures and never
/// waits on their visual completion. Implementations must return promptly.
#[async_trait]
pub trait OverlayController: Send + Sync {
    /// Foreground, fullscreen, refreshed blocking content
    async fn show(&self) -> OverlayResult<()>;

    /// Replace the overlay content with a short message
    async fn show_transient_message(&self, text: &str) -> OverlayResult<()>;

    /// Reveal the desktop
    async fn hide(&self) -> OverlayResult<()>;

    /// Restore the default content selection
    async fn reset(&self) -> OverlayResult<()>;

    /// Dispatch a command to the matching method
    async fn apply(&self, command: &OverlayCommand) -> OverlayResult<()> {
        match command {
            OverlayCommand::Show => self.show().await,
            OverlayCommand::ShowTransientMessage { text } => self.show_transient_message(text).await,
            OverlayCommand::Hide => self.hide().await,
            OverlayCommand::Reset => self.reset().await,
        }
    }
}
