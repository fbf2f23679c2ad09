//! Mock collaborators for testing

use async_trait::async_trait;
use pcgate_api::{OverlayCommand, StatusSnapshot};
use pcgate_util::DeviceId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    AuthorityError, AuthorityResult, OverlayController, OverlayError, OverlayResult, StatusSource,
};

/// Overlay that records every command it receives
#[derive(Clone, Default)]
pub struct MockOverlay {
    commands: Arc<Mutex<Vec<OverlayCommand>>>,

    /// Configure every command to fail (after being recorded)
    pub fail: Arc<Mutex<bool>>,
}

impl MockOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// All commands received so far
    pub fn commands(&self) -> Vec<OverlayCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Drain the recorded commands
    pub fn take_commands(&self) -> Vec<OverlayCommand> {
        std::mem::take(&mut *self.commands.lock().unwrap())
    }

    /// Whether the overlay would currently be on screen
    pub fn is_visible(&self) -> bool {
        let commands = self.commands.lock().unwrap();
        !matches!(
            commands
                .iter()
                .rev()
                .find(|c| !matches!(c, OverlayCommand::Reset)),
            Some(OverlayCommand::Hide)
        )
    }

    fn record(&self, command: OverlayCommand) -> OverlayResult<()> {
        self.commands.lock().unwrap().push(command);
        if *self.fail.lock().unwrap() {
            return Err(OverlayError::Unavailable("mock failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OverlayController for MockOverlay {
    async fn show(&self) -> OverlayResult<()> {
        self.record(OverlayCommand::Show)
    }

    async fn show_transient_message(&self, text: &str) -> OverlayResult<()> {
        self.record(OverlayCommand::ShowTransientMessage {
            text: text.to_string(),
        })
    }

    async fn hide(&self) -> OverlayResult<()> {
        self.record(OverlayCommand::Hide)
    }

    async fn reset(&self) -> OverlayResult<()> {
        self.record(OverlayCommand::Reset)
    }
}

/// Status source that replays a queue of snapshots.
///
/// Once the queue is exhausted the last snapshot handed out keeps being
/// returned, so a test can script a transition and then let the agent idle.
#[derive(Clone)]
pub struct ScriptedAuthority {
    script: Arc<Mutex<VecDeque<StatusSnapshot>>>,
    last: Arc<Mutex<StatusSnapshot>>,
    fetches: Arc<AtomicUsize>,
    registrations: Arc<Mutex<Vec<DeviceId>>>,

    /// Delay before each fetch resolves (simulates a slow authority)
    pub fetch_delay: Arc<Mutex<Option<Duration>>>,

    /// Delay before each registration resolves
    pub register_delay: Arc<Mutex<Option<Duration>>>,

    /// Configure registration to fail
    pub fail_register: Arc<Mutex<bool>>,

    /// Configure the startup reachability check to fail
    pub unreachable: Arc<Mutex<bool>>,
}

impl ScriptedAuthority {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            last: Arc::new(Mutex::new(StatusSnapshot::not_found())),
            fetches: Arc::new(AtomicUsize::new(0)),
            registrations: Arc::new(Mutex::new(Vec::new())),
            fetch_delay: Arc::new(Mutex::new(None)),
            register_delay: Arc::new(Mutex::new(None)),
            fail_register: Arc::new(Mutex::new(false)),
            unreachable: Arc::new(Mutex::new(false)),
        }
    }

    /// Start with a fixed answer for every fetch
    pub fn always(snapshot: StatusSnapshot) -> Self {
        let authority = Self::new();
        *authority.last.lock().unwrap() = snapshot;
        authority
    }

    /// Queue the next snapshot
    pub fn push(&self, snapshot: StatusSnapshot) {
        self.script.lock().unwrap().push_back(snapshot);
    }

    /// Replace the queue and the idle answer with a single snapshot
    pub fn set(&self, snapshot: StatusSnapshot) {
        self.script.lock().unwrap().clear();
        *self.last.lock().unwrap() = snapshot;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> Vec<DeviceId> {
        self.registrations.lock().unwrap().clone()
    }
}

impl Default for ScriptedAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusSource for ScriptedAuthority {
    async fn fetch(&self, _device_id: DeviceId) -> StatusSnapshot {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(snapshot) = next {
            *last = snapshot;
        }
        last.clone()
    }

    async fn register_if_absent(&self, device_id: DeviceId) -> AuthorityResult<()> {
        let delay = *self.register_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.registrations.lock().unwrap().push(device_id);
        if *self.fail_register.lock().unwrap() {
            return Err(AuthorityError::Connect("mock registration failure".into()));
        }
        Ok(())
    }

    async fn verify_reachable(&self) -> AuthorityResult<()> {
        if *self.unreachable.lock().unwrap() {
            return Err(AuthorityError::Connect("mock authority offline".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcgate_api::Expiry;

    #[tokio::test]
    async fn overlay_records_and_tracks_visibility() {
        let overlay = MockOverlay::new();
        assert!(overlay.is_visible());

        overlay.show().await.unwrap();
        overlay.hide().await.unwrap();
        overlay.reset().await.unwrap();
        assert!(!overlay.is_visible());

        overlay
            .apply(&OverlayCommand::ShowTransientMessage { text: "hi".into() })
            .await
            .unwrap();
        assert!(overlay.is_visible());
        assert_eq!(overlay.take_commands().len(), 4);
        assert!(overlay.commands().is_empty());
    }

    #[tokio::test]
    async fn overlay_failure_still_records() {
        let overlay = MockOverlay::new();
        *overlay.fail.lock().unwrap() = true;

        assert!(overlay.show().await.is_err());
        assert_eq!(overlay.commands(), vec![OverlayCommand::Show]);
    }

    #[tokio::test]
    async fn authority_replays_then_sticks() {
        let authority = ScriptedAuthority::new();
        let occupied = StatusSnapshot::occupied(Expiry::Missing);
        authority.push(StatusSnapshot::available());
        authority.push(occupied.clone());

        let id = DeviceId::new(7);
        assert_eq!(authority.fetch(id).await, StatusSnapshot::available());
        assert_eq!(authority.fetch(id).await, occupied);
        assert_eq!(authority.fetch(id).await, occupied);
        assert_eq!(authority.fetch_count(), 3);
    }

    #[tokio::test]
    async fn registration_is_recorded_even_on_failure() {
        let authority = ScriptedAuthority::new();
        *authority.fail_register.lock().unwrap() = true;

        assert!(authority.register_if_absent(DeviceId::new(3)).await.is_err());
        assert_eq!(authority.registrations(), vec![DeviceId::new(3)]);
    }
}
