//! Integration tests for the WebSocket listener and connection IO tasks.
//!
//! Each test binds a real listener on an OS-assigned loopback port and
//! drives it with a plain `tokio-tungstenite` client.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use roomrelay_transport::{
    ClientEvent, ClientHandle, ConnectionConfig, DisconnectReason, ListenerHandle,
    WebSocketListener, connect,
};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// =========================================================================
// Helpers
// =========================================================================

async fn start(
    config: ConnectionConfig,
) -> (String, ListenerHandle, mpsc::UnboundedReceiver<ClientEvent>) {
    let listener = WebSocketListener::bind("127.0.0.1:0", config)
        .await
        .expect("should bind");
    let addr = listener.local_addr().expect("should have addr").to_string();
    let (tx, rx) = mpsc::unbounded_channel();
    (addr, listener.spawn(tx), rx)
}

async fn connect_client(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("client should connect");
    ws
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event should arrive")
        .expect("channel open")
}

async fn expect_connected(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientHandle {
    match next_event(rx).await {
        ClientEvent::Connected(handle) => handle,
        other => panic!("expected Connected, got {other:?}"),
    }
}

async fn expect_disconnected(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> DisconnectReason {
    loop {
        match next_event(rx).await {
            ClientEvent::Disconnected { reason, .. } => return reason,
            ClientEvent::Data { .. } => continue,
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }
}

// =========================================================================
// Data flow
// =========================================================================

#[tokio::test]
async fn test_binary_frames_flow_both_ways() {
    let (addr, _listener, mut events) = start(ConnectionConfig::default()).await;
    let mut client = connect_client(&addr).await;
    let handle = expect_connected(&mut events).await;

    handle.send(b"hello from server".to_vec()).unwrap();
    let msg = client.next().await.unwrap().unwrap();
    assert_eq!(msg.into_data().as_ref(), b"hello from server");

    client
        .send(Message::Binary(b"hello from client".to_vec().into()))
        .await
        .unwrap();
    match next_event(&mut events).await {
        ClientEvent::Data { client: id, data } => {
            assert_eq!(id, handle.id());
            assert_eq!(data, b"hello from client");
        }
        other => panic!("expected Data, got {other:?}"),
    }
}

#[tokio::test]
async fn test_each_connection_gets_a_distinct_id() {
    let (addr, _listener, mut events) = start(ConnectionConfig::default()).await;
    let _a = connect_client(&addr).await;
    let first = expect_connected(&mut events).await;
    let _b = connect_client(&addr).await;
    let second = expect_connected(&mut events).await;
    assert_ne!(first.id(), second.id());
}

// =========================================================================
// Disconnects
// =========================================================================

#[tokio::test]
async fn test_client_close_reports_closed_by_peer() {
    let (addr, _listener, mut events) = start(ConnectionConfig::default()).await;
    let mut client = connect_client(&addr).await;
    let handle = expect_connected(&mut events).await;

    client.send(Message::Close(None)).await.unwrap();

    assert_eq!(expect_disconnected(&mut events).await, DisconnectReason::ClosedByPeer);
    assert!(handle.is_closing());
}

#[tokio::test]
async fn test_server_disconnect_flushes_queue_before_close_frame() {
    let (addr, _listener, mut events) = start(ConnectionConfig::default()).await;
    let mut client = connect_client(&addr).await;
    let handle = expect_connected(&mut events).await;

    handle.send(b"last words".to_vec()).unwrap();
    handle.disconnect(DisconnectReason::Kicked("room closed".into()));

    let first = client.next().await.unwrap().unwrap();
    assert_eq!(first.into_data().as_ref(), b"last words");
    match client.next().await.unwrap().unwrap() {
        Message::Close(Some(frame)) => assert!(frame.reason.contains("room closed")),
        other => panic!("expected close frame, got {other:?}"),
    }

    assert_eq!(
        expect_disconnected(&mut events).await,
        DisconnectReason::Kicked("room closed".into())
    );
}

#[tokio::test]
async fn test_text_frame_is_a_protocol_violation() {
    let (addr, _listener, mut events) = start(ConnectionConfig::default()).await;
    let mut client = connect_client(&addr).await;
    expect_connected(&mut events).await;

    client.send(Message::Text("{\"json\":true}".into())).await.unwrap();

    assert!(matches!(
        expect_disconnected(&mut events).await,
        DisconnectReason::ProtocolViolation(_)
    ));
}

#[tokio::test]
async fn test_silent_client_hits_idle_timeout() {
    let config = ConnectionConfig {
        idle_timeout: Duration::from_millis(200),
        ping_interval: Duration::from_secs(60),
        ..ConnectionConfig::default()
    };
    let (addr, _listener, mut events) = start(config).await;
    let _client = connect_client(&addr).await;
    expect_connected(&mut events).await;

    assert_eq!(expect_disconnected(&mut events).await, DisconnectReason::IdleTimeout);
}

#[tokio::test]
async fn test_client_that_stops_reading_is_released() {
    let config = ConnectionConfig {
        idle_timeout: Duration::from_millis(300),
        ping_interval: Duration::from_secs(60),
        outbound_buffer: 4,
        ..ConnectionConfig::default()
    };
    let (addr, _listener, mut events) = start(config).await;
    // Handshakes, then never polls its socket again.
    let _client = connect_client(&addr).await;
    let handle = expect_connected(&mut events).await;

    let frame = vec![0u8; 256 * 1024];
    for _ in 0..128 {
        if handle.send(frame.clone()).is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let reason = expect_disconnected(&mut events).await;
    assert!(
        matches!(reason, DisconnectReason::Backpressure | DisconnectReason::IdleTimeout),
        "unexpected reason {reason:?}"
    );
    assert!(handle.is_closing());
}

#[tokio::test]
async fn test_pings_keep_a_reading_client_alive_and_measure_rtt() {
    let config = ConnectionConfig {
        idle_timeout: Duration::from_millis(400),
        ping_interval: Duration::from_millis(100),
        ..ConnectionConfig::default()
    };
    let (addr, _listener, mut events) = start(config).await;
    let mut client = connect_client(&addr).await;
    let handle = expect_connected(&mut events).await;

    // Reading lets tungstenite answer the server pings automatically.
    let reader = tokio::spawn(async move { while client.next().await.is_some() {} });

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(!handle.is_closing(), "pong traffic should keep the client alive");
    assert!(handle.rtt().is_some());
    reader.abort();
}

// =========================================================================
// Shutdown and handshakes
// =========================================================================

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (addr, listener, mut events) = start(ConnectionConfig::default()).await;
    let _existing = connect_client(&addr).await;
    let handle = expect_connected(&mut events).await;

    listener.shutdown().await;

    let refused = tokio_tungstenite::connect_async(format!("ws://{addr}")).await;
    assert!(refused.is_err(), "no new connections after shutdown");
    // Established connections are left to their owner.
    assert!(!handle.is_closing());
}

#[tokio::test]
async fn test_stalled_handshake_never_reaches_the_owner() {
    use tokio::io::AsyncReadExt;

    let config = ConnectionConfig {
        handshake_timeout: Duration::from_millis(100),
        ..ConnectionConfig::default()
    };
    let (addr, listener, mut events) = start(config).await;

    // A raw TCP client that never sends the upgrade request.
    let mut raw = tokio::net::TcpStream::connect(&addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), raw.read(&mut buf))
        .await
        .expect("server should drop the socket");
    assert_eq!(read.unwrap_or(0), 0);

    listener.shutdown().await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_dialed_connection_behaves_like_accepted_one() {
    let (addr, _listener, mut server_events) = start(ConnectionConfig::default()).await;

    let dialed = connect(&format!("ws://{addr}"), ConnectionConfig::default())
        .await
        .expect("should dial");
    let (tx, mut dial_events) = mpsc::unbounded_channel();
    dialed.spawn(tx);

    let server_side = expect_connected(&mut server_events).await;
    let dial_side = expect_connected(&mut dial_events).await;

    dial_side.send(vec![9, 9]).unwrap();
    match next_event(&mut server_events).await {
        ClientEvent::Data { client, data } => {
            assert_eq!(client, server_side.id());
            assert_eq!(data, vec![9, 9]);
        }
        other => panic!("expected Data, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dial_failure_is_a_handshake_error() {
    // Bind and drop to get a port that is very likely closed.
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let result = connect(&format!("ws://127.0.0.1:{port}"), ConnectionConfig::default()).await;
    assert!(result.is_err());
}
