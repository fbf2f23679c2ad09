//! pcgated - time-bounded access gate for a shared workstation
//!
//! This is the main entry point for the agent. It wires together:
//! - Configuration loading
//! - The remote authority client and its startup reachability check
//! - The IPC server and the display bridge
//! - The agent loop

use anyhow::{Context, Result};
use clap::Parser;
use pcgate_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, Response, ResponsePayload,
};
use pcgate_authority::StatusClient;
use pcgate_config::load_agent_config;
use pcgate_core::{Agent, AgentConfig, AgentHandle, CoreEvent};
use pcgate_host_api::StatusSource;
use pcgate_ipc::{IpcOverlay, IpcServer, ServerMessage};
use pcgate_util::{default_config_path, ClientId, DeviceId, ErrorTag, GateError};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long to wait for the agent loop to wind down on exit
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// pcgated - blocks this workstation unless the authority reports a paid session
#[derive(Parser, Debug)]
#[command(name = "pcgated")]
#[command(about = "Time-bounded access gate for a shared workstation", long_about = None)]
struct Args {
    /// Identity of this workstation at the authority (non-negative integer)
    device_id: DeviceId,
}

/// What the main loop should do after handling a message
enum Flow {
    Continue,
    Quit,
}

/// Main service state
struct Service {
    ipc: Arc<IpcServer>,
    agent: Agent,
    handle: AgentHandle,
    core_events: mpsc::UnboundedReceiver<CoreEvent>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config_path = default_config_path();
        let settings = load_agent_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?;

        info!(
            config_path = %config_path.display(),
            authority = %settings.authority.url,
            poll_interval_secs = settings.agent.poll_interval.as_secs(),
            "Configuration loaded"
        );

        let client = StatusClient::new(&settings.authority)
            .context("Failed to create authority client")?;

        check_authority(&client, &settings.authority.url).await?;

        let mut ipc = IpcServer::new(&settings.agent.socket_path);
        ipc.start().await?;

        let content_url = settings.agent.content_url(args.device_id);
        info!(
            socket_path = %settings.agent.socket_path.display(),
            content_url = %content_url,
            "IPC server started"
        );

        let overlay = IpcOverlay::new(ipc.event_sender(), content_url);
        let (core_tx, core_events) = mpsc::unbounded_channel();
        let (agent, handle) = Agent::new(
            AgentConfig::new(args.device_id, &settings.agent),
            Arc::new(client),
            Arc::new(overlay),
        );

        Ok(Self {
            ipc: Arc::new(ipc),
            agent: agent.with_events(core_tx),
            handle,
            core_events,
        })
    }

    async fn run(self) -> Result<()> {
        let Service {
            ipc,
            agent,
            handle,
            mut core_events,
        } = self;

        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let agent_task = tokio::spawn(agent.run());

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                Some(event) = core_events.recv() => {
                    if let Flow::Quit = Self::handle_core_event(&ipc, event) {
                        break;
                    }
                }

                Some(msg) = ipc_messages.recv() => {
                    if let Flow::Quit = Self::handle_ipc_message(&ipc, &handle, msg).await {
                        break;
                    }
                }
            }
        }

        info!("Shutting down pcgated");

        handle.quit();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, agent_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Agent task failed"),
            Err(_) => warn!("Agent did not stop in time"),
        }

        ipc.broadcast_event(Event::new(EventPayload::Shutdown));
        ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }

    fn handle_core_event(ipc: &Arc<IpcServer>, event: CoreEvent) -> Flow {
        let payload = match event {
            CoreEvent::ModeChanged { from, to, verdict } => {
                EventPayload::ModeChanged { from, to, verdict }
            }
            CoreEvent::PollFailed { tag } => EventPayload::AuthorityError {
                tag,
                message: format!("status poll failed: {}", tag),
            },
            CoreEvent::RegistrationFailed { message } => EventPayload::AuthorityError {
                tag: ErrorTag::Transient,
                message,
            },
            CoreEvent::Stopped => {
                warn!("Agent loop stopped");
                return Flow::Quit;
            }
        };

        ipc.broadcast_event(Event::new(payload));
        Flow::Continue
    }

    async fn handle_ipc_message(
        ipc: &Arc<IpcServer>,
        handle: &AgentHandle,
        msg: ServerMessage,
    ) -> Flow {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let subscribe = matches!(request.command, Command::SubscribeEvents);
                let (response, flow) =
                    Self::handle_command(ipc, handle, &client_id, request.request_id, request.command)
                        .await;

                let _ = ipc.send_response(&client_id, response).await;

                // After the response so the display sees it first
                if subscribe {
                    handle.resync();
                }

                flow
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );
                Flow::Continue
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");
                Flow::Continue
            }
        }
    }

    async fn handle_command(
        ipc: &Arc<IpcServer>,
        handle: &AgentHandle,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> (Response, Flow) {
        let role = ipc
            .get_client_info(client_id)
            .await
            .map(|info| info.role)
            .unwrap_or(ClientRole::Observer);

        let response = match command {
            Command::GetState => match handle.state().await {
                Some(state) => Response::success(request_id, ResponsePayload::State(state)),
                None => Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::ShuttingDown, "Agent is stopping"),
                ),
            },

            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            ),

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::ReportVisibility { visible } => {
                if !role.can_report_visibility() {
                    return (permission_denied(request_id, "report visibility"), Flow::Continue);
                }
                handle.report_visibility(visible);
                Response::success(request_id, ResponsePayload::VisibilityNoted)
            }

            Command::Quit => {
                if !role.can_quit() {
                    return (permission_denied(request_id, "quit"), Flow::Continue);
                }
                info!(client_id = %client_id, "Quit requested by operator");
                return (
                    Response::success(request_id, ResponsePayload::Quitting),
                    Flow::Quit,
                );
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        };

        (response, Flow::Continue)
    }
}

/// Startup reachability check, the only fatal authority failure
async fn check_authority(source: &dyn StatusSource, url: &str) -> Result<(), GateError> {
    source.verify_reachable().await.map_err(|e| {
        let err = GateError::unreachable(format!("{} ({})", url, e));
        error!(authority = %url, error = %e, tag = %err.tag(), "Cannot reach authority");
        err
    })
}

fn permission_denied(request_id: u64, action: &str) -> Response {
    Response::error(
        request_id,
        ErrorInfo::new(
            ErrorCode::PermissionDenied,
            format!("Only the operator may {}", action),
        ),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // No flags besides the identity, so the level comes from RUST_LOG only
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        device_id = %args.device_id,
        "pcgated starting"
    );

    if pcgate_util::is_mock_time_active() {
        warn!(now = %pcgate_util::now(), "Mock time active, deadlines are evaluated against it");
    }

    let service = Service::new(&args).await?;
    service.run().await
}
