//! Integration tests for pcgated
//!
//! These run the real authority client against a local HTTP stub and the
//! real IPC server with a display client attached.

use chrono::Utc;
use pcgate_api::{
    AccessMode, Command, Event, EventPayload, OverlayCommand, Response, ResponsePayload,
};
use pcgate_authority::StatusClient;
use pcgate_config::{parse_config, AuthoritySettings};
use pcgate_core::{Agent, AgentConfig, AgentHandle};
use pcgate_host_api::StatusSource;
use pcgate_ipc::{EventStream, IpcClient, IpcOverlay, IpcServer, ServerMessage};
use pcgate_util::DeviceId;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const WAIT: Duration = Duration::from_secs(5);

/// HTTP stub whose response body can be swapped while it runs
async fn authority_stub(body: Arc<Mutex<String>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let body = body.lock().unwrap().clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

fn authority_settings(url: &str) -> AuthoritySettings {
    AuthoritySettings {
        url: url.to_string(),
        api_key: Some("test-key".into()),
        table: "pcs_status".into(),
        request_timeout: Duration::from_secs(1),
    }
}

fn occupied_body(device: u64, secs: i64) -> String {
    let deadline = Utc::now() + chrono::Duration::seconds(secs);
    format!(
        r#"[{{"id":{},"estado":"ocupada","tiempo_limite":"{}"}}]"#,
        device,
        deadline.to_rfc3339()
    )
}

/// Answer requests the way the service does for a display client
fn serve_requests(ipc: Arc<IpcServer>, handle: AgentHandle) {
    tokio::spawn(async move {
        let Some(mut messages) = ipc.take_message_receiver().await else {
            return;
        };
        while let Some(message) = messages.recv().await {
            if let ServerMessage::Request { client_id, request } = message {
                let subscribe = matches!(request.command, Command::SubscribeEvents);
                let payload = match request.command {
                    Command::SubscribeEvents => ResponsePayload::Subscribed {
                        client_id: client_id.clone(),
                    },
                    Command::ReportVisibility { visible } => {
                        handle.report_visibility(visible);
                        ResponsePayload::VisibilityNoted
                    }
                    _ => ResponsePayload::Pong,
                };
                let _ = ipc
                    .send_response(&client_id, Response::success(request.request_id, payload))
                    .await;
                if subscribe {
                    handle.resync();
                }
            }
        }
    });
}

async fn next_overlay(stream: &mut EventStream) -> OverlayCommand {
    loop {
        let event: Event = tokio::time::timeout(WAIT, stream.next())
            .await
            .expect("timed out waiting for an event")
            .unwrap();
        if let EventPayload::Overlay { command, content_url } = event.payload {
            assert_eq!(content_url, "http://kiosk.local/overlay/9");
            return command;
        }
    }
}

#[tokio::test]
async fn grant_then_revoke_reaches_the_display() {
    let body = Arc::new(Mutex::new(occupied_body(9, 600)));
    let url = authority_stub(body.clone()).await;
    let client = StatusClient::new(&authority_settings(&url)).unwrap();
    client.verify_reachable().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("pcgated.sock");
    let mut ipc = IpcServer::new(&socket_path);
    ipc.start().await.unwrap();
    let ipc = Arc::new(ipc);
    let accept = ipc.clone();
    tokio::spawn(async move { accept.run().await });

    let overlay = IpcOverlay::new(ipc.event_sender(), "http://kiosk.local/overlay/9");
    let config = AgentConfig {
        device_id: DeviceId::new(9),
        poll_interval: Duration::from_millis(100),
        grace_period: Duration::from_millis(300),
        transient_message: "preparing".into(),
    };
    let (agent, handle) = Agent::new(config, Arc::new(client), Arc::new(overlay));
    serve_requests(ipc.clone(), handle.clone());

    // Display attaches before the agent starts, so the replayed state comes first
    let mut display = IpcClient::connect(&socket_path)
        .await
        .unwrap()
        .subscribe()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let agent_task = tokio::spawn(agent.run());

    assert_eq!(next_overlay(&mut display).await, OverlayCommand::Show);
    assert_eq!(
        next_overlay(&mut display).await,
        OverlayCommand::ShowTransientMessage {
            text: "preparing".into()
        }
    );
    assert_eq!(next_overlay(&mut display).await, OverlayCommand::Hide);
    assert_eq!(next_overlay(&mut display).await, OverlayCommand::Reset);
    assert_eq!(handle.state().await.unwrap().mode, AccessMode::Granting);

    *body.lock().unwrap() = r#"[{"id":9,"estado":"disponible","tiempo_limite":null}]"#.into();
    assert_eq!(next_overlay(&mut display).await, OverlayCommand::Show);

    let state = handle.state().await.unwrap();
    assert_eq!(state.mode, AccessMode::Blocking);
    assert_eq!(state.device_id, DeviceId::new(9));

    // The display lost the overlay, so the next poll puts it back
    display
        .notify(Command::ReportVisibility { visible: false })
        .await
        .unwrap();
    assert_eq!(next_overlay(&mut display).await, OverlayCommand::Show);

    handle.quit();
    tokio::time::timeout(WAIT, agent_task).await.unwrap().unwrap();
}

#[tokio::test]
async fn expired_deadline_keeps_blocking() {
    let body = Arc::new(Mutex::new(occupied_body(9, -60)));
    let url = authority_stub(body).await;
    let client = StatusClient::new(&authority_settings(&url)).unwrap();

    let snapshot = client.fetch(DeviceId::new(9)).await;
    assert!(snapshot.found && snapshot.occupied);

    let verdict = pcgate_core::evaluate(&snapshot, Utc::now());
    assert_eq!(verdict.mode(), AccessMode::Blocking);
}

#[tokio::test]
async fn unreachable_authority_fails_startup_check_only() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = StatusClient::new(&authority_settings(&format!("http://{}", addr))).unwrap();
    assert!(client.verify_reachable().await.is_err());

    // Per-poll failures never escape fetch
    let snapshot = client.fetch(DeviceId::new(1)).await;
    assert!(!snapshot.found);
    assert!(snapshot.error.is_some());
}

#[test]
fn config_feeds_agent_parameters() {
    let settings = parse_config(
        r#"
        config_version = 1

        [authority]
        url = "https://example.supabase.co"

        [agent]
        poll_interval_seconds = 10
        grace_period_seconds = 2
        content_url_template = "http://kiosk.local/overlay/{id}"
    "#,
    )
    .unwrap();

    let config = AgentConfig::new(DeviceId::new(9), &settings.agent);
    assert_eq!(config.poll_interval, Duration::from_secs(10));
    assert_eq!(config.grace_period, Duration::from_secs(2));
    assert_eq!(
        settings.agent.content_url(DeviceId::new(9)),
        "http://kiosk.local/overlay/9"
    );
}
