//! Overlay controller backed by the event stream
//!
//! The display runs as a separate process subscribed to the socket. Each
//! command is published as an `Overlay` event carrying the content URL the
//! display loads while blocking.

use async_trait::async_trait;
use pcgate_api::{Event, EventPayload, OverlayCommand};
use pcgate_host_api::{OverlayController, OverlayResult};
use tokio::sync::broadcast;
use tracing::debug;

pub struct IpcOverlay {
    events: broadcast::Sender<Event>,
    content_url: String,
}

impl IpcOverlay {
    pub fn new(events: broadcast::Sender<Event>, content_url: impl Into<String>) -> Self {
        Self {
            events,
            content_url: content_url.into(),
        }
    }

    fn publish(&self, command: OverlayCommand) -> OverlayResult<()> {
        let event = Event::new(EventPayload::Overlay {
            command,
            content_url: self.content_url.clone(),
        });

        if self.events.send(event).is_err() {
            // Replayed on subscribe
            debug!("No display attached, overlay command not delivered");
        }
        Ok(())
    }
}

#[async_trait]
impl OverlayController for IpcOverlay {
    async fn show(&self) -> OverlayResult<()> {
        self.publish(OverlayCommand::Show)
    }

    async fn show_transient_message(&self, text: &str) -> OverlayResult<()> {
        self.publish(OverlayCommand::ShowTransientMessage {
            text: text.to_string(),
        })
    }

    async fn hide(&self) -> OverlayResult<()> {
        self.publish(OverlayCommand::Hide)
    }

    async fn reset(&self) -> OverlayResult<()> {
        self.publish(OverlayCommand::Reset)
    }
}
