//! End-to-end tests against a real WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use envmon_core::retry::BackoffConfig;
use envmon_link::{
    ConnectionEvent, ConnectionManager, ConnectionState, LinkConfig, NoIdentity, StatusEvent,
};

const TIMEOUT: Duration = Duration::from_secs(5);

struct ServerConn {
    path: String,
    ws: WebSocketStream<TcpStream>,
}

/// Bind a WebSocket server on an ephemeral port; accepted connections are
/// handed to the test.
async fn boot_server() -> (String, mpsc::UnboundedReceiver<ServerConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    drop(tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let (path_tx, path_rx) = std::sync::mpsc::channel();
            let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                let _ = path_tx.send(request.uri().to_string());
                Ok(response)
            };
            let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                continue;
            };
            let path = path_rx.recv().unwrap_or_default();
            if tx.send(ServerConn { path, ws }).is_err() {
                break;
            }
        }
    }));

    (format!("ws://{addr}/api/v1/sensor/ws"), rx)
}

fn config(url: String) -> LinkConfig {
    LinkConfig {
        url,
        connect_timeout: Duration::from_secs(5),
        backoff: BackoffConfig {
            base_interval_ms: 50,
            max_interval_ms: 200,
            jitter_factor: 0.0,
        },
        ..LinkConfig::default()
    }
}

fn collect(manager: &ConnectionManager) -> mpsc::UnboundedReceiver<ConnectionEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _remover = manager.add_listener(Arc::new(move |event: &ConnectionEvent| {
        let _ = tx.send(event.clone());
    }));
    rx
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("listener dropped")
}

async fn next_telemetry(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> Value {
    loop {
        if let ConnectionEvent::Telemetry(payload) = next_event(events).await {
            return payload;
        }
    }
}

async fn wait_for_state(
    events: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    state: ConnectionState,
) -> StatusEvent {
    loop {
        if let ConnectionEvent::Status(status) = next_event(events).await {
            if status.status == state {
                return status;
            }
        }
    }
}

async fn accept(conns: &mut mpsc::UnboundedReceiver<ServerConn>) -> ServerConn {
    timeout(TIMEOUT, conns.recv())
        .await
        .expect("timed out waiting for client")
        .expect("server stopped")
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let message = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("client went away")
            .expect("socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn connects_with_identity_and_delivers_telemetry() {
    let (url, mut conns) = boot_server().await;
    let manager = ConnectionManager::websocket(config(url), Arc::new(NoIdentity));
    let mut events = collect(&manager);

    manager.connect("ops@example.com");
    let mut conn = accept(&mut conns).await;
    assert_eq!(conn.path, "/api/v1/sensor/ws?email=ops%40example.com");
    let _ = wait_for_state(&mut events, ConnectionState::Connected).await;
    assert!(manager.status().connected);

    let welcome = json!({"status": "connected", "message": "Connected to sensor data stream", "connections": 1});
    conn.ws.send(Message::text(welcome.to_string())).await.unwrap();
    let payload = next_telemetry(&mut events).await;
    assert_eq!(payload["status"], "connected");
    assert!(payload["timestamp"].is_string());

    let reading = json!({"temperature": 22.4, "humidity": 41.0, "obstacle": false, "timestamp": "2026-03-01T10:00:00"});
    conn.ws.send(Message::text(reading.to_string())).await.unwrap();
    let payload = next_telemetry(&mut events).await;
    assert_eq!(payload["temperature"], 22.4);
    assert_eq!(payload["timestamp"], "2026-03-01T10:00:00");

    manager.shutdown();
}

#[tokio::test]
async fn heartbeat_reaches_server_and_pong_is_swallowed() {
    let (url, mut conns) = boot_server().await;
    let mut config = config(url);
    config.heartbeat_interval = Duration::from_millis(100);
    let manager = ConnectionManager::websocket(config, Arc::new(NoIdentity));
    let mut events = collect(&manager);

    manager.connect("ops@example.com");
    let mut conn = accept(&mut conns).await;
    let _ = wait_for_state(&mut events, ConnectionState::Connected).await;

    let ping = next_text(&mut conn.ws).await;
    assert_eq!(ping["type"], "ping");
    assert!(ping["timestamp"].is_string());

    conn.ws.send(Message::text(r#"{"type":"pong"}"#)).await.unwrap();
    conn.ws
        .send(Message::text(r#"{"temperature": 18.0}"#))
        .await
        .unwrap();
    let payload = next_telemetry(&mut events).await;
    assert_eq!(payload["temperature"], 18.0);

    manager.shutdown();
}

#[tokio::test]
async fn server_close_triggers_reconnect() {
    let (url, mut conns) = boot_server().await;
    let manager = ConnectionManager::websocket(config(url), Arc::new(NoIdentity));
    let mut events = collect(&manager);

    manager.connect("ops@example.com");
    let mut first = accept(&mut conns).await;
    let _ = wait_for_state(&mut events, ConnectionState::Connected).await;

    first
        .ws
        .close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        }))
        .await
        .unwrap();

    let lost = wait_for_state(&mut events, ConnectionState::Disconnected).await;
    assert_eq!(lost.code, Some(1001));
    assert_eq!(lost.reason.as_deref(), Some("restarting"));
    let reconnecting = wait_for_state(&mut events, ConnectionState::Reconnecting).await;
    assert_eq!(reconnecting.attempt, Some(1));
    assert_eq!(reconnecting.delay_ms, Some(50));

    let second = accept(&mut conns).await;
    assert!(second.path.ends_with("email=ops%40example.com"));
    let _ = wait_for_state(&mut events, ConnectionState::Connected).await;
    assert_eq!(manager.status().reconnect_attempts, 0);

    manager.shutdown();
}

#[tokio::test]
async fn disconnect_sends_normal_closure() {
    let (url, mut conns) = boot_server().await;
    let manager = ConnectionManager::websocket(config(url), Arc::new(NoIdentity));
    let mut events = collect(&manager);

    manager.connect("ops@example.com");
    let mut conn = accept(&mut conns).await;
    let _ = wait_for_state(&mut events, ConnectionState::Connected).await;

    manager.disconnect();
    let _ = wait_for_state(&mut events, ConnectionState::Disconnected).await;

    let frame = loop {
        match timeout(TIMEOUT, conn.ws.next()).await.expect("no close frame") {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => {}
            other => panic!("unexpected end of stream: {other:?}"),
        }
    };
    assert_eq!(frame.map(|f| u16::from(f.code)), Some(1000));

    // no reconnect after an explicit disconnect
    assert!(timeout(Duration::from_millis(500), conns.recv()).await.is_err());
    assert!(!manager.status().is_reconnecting);
}

#[tokio::test]
async fn unreachable_server_reports_error_and_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = config(format!("ws://{addr}/api/v1/sensor/ws"));
    config.max_attempts = 2;
    let manager = ConnectionManager::websocket(config, Arc::new(NoIdentity));
    let mut events = collect(&manager);

    manager.connect("ops@example.com");
    let error = wait_for_state(&mut events, ConnectionState::Error).await;
    assert!(error.error.is_some());
    let _ = wait_for_state(&mut events, ConnectionState::Reconnecting).await;
    let failed = wait_for_state(&mut events, ConnectionState::Failed).await;
    assert_eq!(failed.attempt, Some(2));
    assert_eq!(manager.status().reconnect_attempts, 2);
}
