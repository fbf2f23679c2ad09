//! The agent loop
//!
//! Every mutation of the access state happens inside [`Agent::run`], one
//! event at a time. Fetches and registrations run in their own tasks and
//! report back through the same queue as timers and client requests.

use chrono::{DateTime, Utc};
use pcgate_api::{AgentStateSnapshot, OverlayCommand, StatusSnapshot, API_VERSION};
use pcgate_config::AgentSettings;
use pcgate_host_api::{OverlayController, StatusSource};
use pcgate_util::{DeviceId, ErrorTag};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{AccessStateMachine, CoreEvent, Scheduler, TaskToken};

/// Inputs to the agent loop
#[derive(Debug)]
pub enum AgentEvent {
    /// Time to poll the authority
    PollTick,
    /// A fetch finished
    PollCompleted { snapshot: StatusSnapshot },
    /// The deferred hide timer fired
    HideDue(TaskToken),
    /// The display reported whether the overlay is on screen
    OverlayVisibility { visible: bool },
    /// A display attached and needs the current overlay state
    Resync,
    /// Report current state
    StateRequest(oneshot::Sender<AgentStateSnapshot>),
    /// Stop the loop and every timer
    Quit,
}

/// Agent parameters
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub device_id: DeviceId,
    pub poll_interval: Duration,
    pub grace_period: Duration,
    pub transient_message: String,
}

impl AgentConfig {
    pub fn new(device_id: DeviceId, settings: &AgentSettings) -> Self {
        Self {
            device_id,
            poll_interval: settings.poll_interval,
            grace_period: settings.grace_period,
            transient_message: settings.transient_message.clone(),
        }
    }
}

/// Cloneable sender side of a running agent
#[derive(Debug, Clone)]
pub struct AgentHandle {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl AgentHandle {
    pub fn report_visibility(&self, visible: bool) -> bool {
        self.tx.send(AgentEvent::OverlayVisibility { visible }).is_ok()
    }

    pub fn resync(&self) -> bool {
        self.tx.send(AgentEvent::Resync).is_ok()
    }

    pub fn quit(&self) -> bool {
        self.tx.send(AgentEvent::Quit).is_ok()
    }

    /// Current state, or `None` once the agent has stopped
    pub async fn state(&self) -> Option<AgentStateSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(AgentEvent::StateRequest(reply_tx)).ok()?;
        reply_rx.await.ok()
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Single-writer owner of the access state machine
pub struct Agent {
    config: AgentConfig,
    source: Arc<dyn StatusSource>,
    overlay: Arc<dyn OverlayController>,
    machine: AccessStateMachine,
    scheduler: Scheduler<AgentEvent>,
    tx: mpsc::UnboundedSender<AgentEvent>,
    rx: mpsc::UnboundedReceiver<AgentEvent>,
    events: Option<mpsc::UnboundedSender<CoreEvent>>,
    hide_token: Option<TaskToken>,
    poll_task: Option<JoinHandle<()>>,
    registration_task: Option<JoinHandle<()>>,
    last_snapshot: Option<StatusSnapshot>,
    last_poll_at: Option<DateTime<Utc>>,
    last_error: Option<ErrorTag>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        source: Arc<dyn StatusSource>,
        overlay: Arc<dyn OverlayController>,
    ) -> (Self, AgentHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let machine = AccessStateMachine::new(config.grace_period, config.transient_message.clone());

        let agent = Self {
            config,
            source,
            overlay,
            machine,
            scheduler: Scheduler::new(tx.clone()),
            tx: tx.clone(),
            rx,
            events: None,
            hide_token: None,
            poll_task: None,
            registration_task: None,
            last_snapshot: None,
            last_poll_at: None,
            last_error: None,
        };

        (agent, AgentHandle { tx })
    }

    /// Forward core events to `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<CoreEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run until `Quit`
    pub async fn run(mut self) {
        info!(
            device_id = %self.config.device_id,
            poll_interval_secs = self.config.poll_interval.as_secs_f64(),
            grace_period_secs = self.config.grace_period.as_secs_f64(),
            "Agent started"
        );

        self.scheduler
            .schedule_periodic(self.config.poll_interval, || AgentEvent::PollTick);

        while let Some(event) = self.rx.recv().await {
            match event {
                AgentEvent::PollTick => self.start_poll(),
                AgentEvent::PollCompleted { snapshot } => {
                    self.poll_task = None;
                    self.on_snapshot(snapshot, pcgate_util::now()).await;
                }
                AgentEvent::HideDue(token) => self.on_hide_due(token).await,
                AgentEvent::OverlayVisibility { visible } => {
                    self.machine.note_overlay_visibility(visible);
                }
                AgentEvent::Resync => {
                    let commands = self.machine.current_commands();
                    self.apply(commands).await;
                }
                AgentEvent::StateRequest(reply) => {
                    let _ = reply.send(self.state_snapshot());
                }
                AgentEvent::Quit => {
                    info!("Quit requested");
                    break;
                }
            }
        }

        self.scheduler.shutdown();
        for task in [self.poll_task.take(), self.registration_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        self.hide_token = None;
        self.notify(CoreEvent::Stopped);
        info!("Agent stopped");
    }

    fn start_poll(&mut self) {
        if self.poll_task.is_some() {
            debug!("Previous poll still in flight, skipping tick");
            return;
        }

        let source = self.source.clone();
        let tx = self.tx.clone();
        let device_id = self.config.device_id;
        self.poll_task = Some(tokio::spawn(async move {
            // A panicking source still reports back, as an unknown state
            let fetch = tokio::spawn(async move { source.fetch(device_id).await });
            let snapshot = match fetch.await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "Status fetch aborted");
                    StatusSnapshot::unknown(ErrorTag::Transient)
                }
            };
            let _ = tx.send(AgentEvent::PollCompleted { snapshot });
        }));
    }

    async fn on_snapshot(&mut self, snapshot: StatusSnapshot, now: DateTime<Utc>) {
        let decision = self.machine.decide(&snapshot, now);

        self.last_poll_at = Some(now);
        self.last_error = snapshot.error;
        if let Some(tag) = snapshot.error {
            self.notify(CoreEvent::PollFailed { tag });
        }
        self.last_snapshot = Some(snapshot);

        if decision.register {
            self.spawn_registration();
        }

        if decision.cancel_pending_hide
            && let Some(token) = self.hide_token.take()
        {
            self.scheduler.cancel(token);
        }

        if let Some(hide) = decision.schedule_hide {
            if let Some(stale) = self.hide_token.take() {
                self.scheduler.cancel(stale);
            }
            self.hide_token = Some(self.scheduler.schedule_once(hide.delay, AgentEvent::HideDue));
        }

        if let Some((from, to)) = decision.transition {
            self.notify(CoreEvent::ModeChanged {
                from,
                to,
                verdict: decision.verdict,
            });
        }

        self.apply(decision.commands).await;
    }

    async fn on_hide_due(&mut self, token: TaskToken) {
        if !self.scheduler.complete(token) {
            debug!(token = %token, "Ignoring cancelled hide");
            return;
        }
        if self.hide_token == Some(token) {
            self.hide_token = None;
        }

        let commands = self.machine.on_hide_due();
        self.apply(commands).await;
    }

    fn spawn_registration(&mut self) {
        if self
            .registration_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            debug!("Registration still in flight");
            return;
        }

        let source = self.source.clone();
        let events = self.events.clone();
        let device_id = self.config.device_id;

        self.registration_task = Some(tokio::spawn(async move {
            match source.register_if_absent(device_id).await {
                Ok(()) => info!(device_id = %device_id, "Registration requested"),
                Err(e) => {
                    warn!(device_id = %device_id, error = %e, "Registration failed");
                    if let Some(events) = events {
                        let _ = events.send(CoreEvent::RegistrationFailed {
                            message: e.to_string(),
                        });
                    }
                }
            }
        }));
    }

    async fn apply(&self, commands: Vec<OverlayCommand>) {
        for command in commands {
            debug!(command = ?command, "Overlay command");
            if let Err(e) = self.overlay.apply(&command).await {
                warn!(command = ?command, error = %e, "Overlay command failed");
            }
        }
    }

    fn notify(&self, event: CoreEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn state_snapshot(&self) -> AgentStateSnapshot {
        let state = self.machine.state();
        AgentStateSnapshot {
            api_version: API_VERSION,
            device_id: self.config.device_id,
            mode: state.mode,
            overlay_visible: state.overlay_visible,
            pending_hide_deadline: state.pending_hide_deadline,
            last_snapshot: self.last_snapshot.clone(),
            last_poll_at: self.last_poll_at,
            last_error: self.last_error,
        }
    }
}
