//! End-to-end tests: real WebSocket clients speaking STOMP to a running
//! Gatehouse server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gatehouse::prelude::*;
use gatehouse_protocol::{header, FrameCodec, StompCodec};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    addr: String,
    cache: MemoryCache,
    registry: Arc<SubscriptionRegistry>,
    delivered: mpsc::UnboundedReceiver<(SessionId, Frame)>,
}

/// Starts a server on a random port with three known users.
async fn start_server(config: InterceptorConfig) -> TestServer {
    let cache = MemoryCache::new();
    let registry = Arc::new(SubscriptionRegistry::new());
    let interceptor = FrameInterceptor::new(
        StaticTokenValidator::new()
            .with_token("tok-u1", UserId::new("U1"))
            .with_token("tok-u2", UserId::new("U2")),
        MemoryIdentityStore::with_accounts([
            Account::active(UserId::new("U1"), "alice"),
            Account::active(UserId::new("U2"), "bob"),
            Account::active(UserId::new("kim@mail.io"), "kim"),
        ]),
        cache.clone(),
        Arc::new(MemoryGameState::new(cache.clone())),
    )
    .with_registry(Arc::clone(&registry));
    let (broker, delivered) = ChannelBroker::new();

    let server = GatehouseServer::builder()
        .bind("127.0.0.1:0")
        .config(config)
        .build(interceptor, broker)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    TestServer {
        addr,
        cache,
        registry,
        delivered,
    }
}

async fn open(addr: &str, query: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/stomp{query}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, frame: &Frame) {
    let bytes = StompCodec.encode(frame);
    let text = String::from_utf8(bytes).expect("test frames are text");
    ws.send(Message::Text(text.into())).await.expect("send");
}

/// Reads the next STOMP frame, failing on close or timeout.
async fn recv(ws: &mut ClientWs) -> Frame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        match msg {
            Message::Text(_) | Message::Binary(_) => {
                return StompCodec.decode(&msg.into_data()).expect("decode");
            }
            Message::Close(_) => panic!("connection closed while waiting for frame"),
            _ => continue,
        }
    }
}

/// Asserts that the server closes the connection.
async fn expect_closed(ws: &mut ClientWs) {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("server did not close the connection");
        match next {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(other)) => panic!("expected close, got {other:?}"),
        }
    }
}

fn connect_frame(token: Option<&str>) -> Frame {
    let frame = Frame::new(Command::Connect)
        .with_header("accept-version", "1.2")
        .with_header("host", "localhost");
    match token {
        Some(token) => frame.with_header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => frame,
    }
}

fn subscribe_frame(destination: &str, receipt: &str) -> Frame {
    Frame::new(Command::Subscribe)
        .with_header("id", "sub-0")
        .with_header(header::DESTINATION, destination)
        .with_header(header::RECEIPT, receipt)
}

async fn connected(addr: &str, token: &str) -> ClientWs {
    let mut ws = open(addr, "").await;
    send(&mut ws, &connect_frame(Some(token))).await;
    let reply = recv(&mut ws).await;
    assert_eq!(reply.command, Command::Connected);
    ws
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_connect_with_token_receives_connected() {
    let mut server = start_server(InterceptorConfig::default()).await;
    let mut ws = open(&server.addr, "").await;

    send(&mut ws, &connect_frame(Some("tok-u1"))).await;
    let reply = recv(&mut ws).await;

    assert_eq!(reply.command, Command::Connected);
    assert_eq!(reply.header(header::VERSION), Some("1.2"));
    let (_, forwarded) = server.delivered.recv().await.unwrap();
    assert_eq!(forwarded.command, Command::Connect);
    assert!(server.cache.get("userinfo:U1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_connect_with_handshake_query_user() {
    let server = start_server(InterceptorConfig::default()).await;
    let mut ws = open(&server.addr, "?userId=U2").await;

    send(&mut ws, &connect_frame(None)).await;

    assert_eq!(recv(&mut ws).await.command, Command::Connected);
    assert!(server.cache.get("userinfo:U2").await.unwrap().is_some());
}

#[tokio::test]
async fn test_connect_with_percent_encoded_query_user() {
    let server = start_server(InterceptorConfig::default()).await;
    let mut ws = open(&server.addr, "?userId=kim%40mail.io").await;

    send(&mut ws, &connect_frame(None)).await;

    assert_eq!(recv(&mut ws).await.command, Command::Connected);
    assert!(server.cache.get("userinfo:kim@mail.io").await.unwrap().is_some());
}

#[tokio::test]
async fn test_connect_with_bad_token_sends_error_and_closes() {
    let mut server = start_server(InterceptorConfig::default()).await;
    let mut ws = open(&server.addr, "?userId=U1").await;

    send(&mut ws, &connect_frame(Some("forged"))).await;
    let reply = recv(&mut ws).await;

    assert_eq!(reply.command, Command::Error);
    assert!(reply.header(header::MESSAGE).unwrap().contains("authentication failed"));
    expect_closed(&mut ws).await;
    assert!(server.delivered.try_recv().is_err(), "nothing reaches the broker");
    assert!(server.cache.is_empty().await);
}

#[tokio::test]
async fn test_heartbeat_before_connect_is_ignored() {
    let server = start_server(InterceptorConfig::default()).await;
    let mut ws = open(&server.addr, "").await;

    ws.send(Message::Text("\n".into())).await.unwrap();
    send(&mut ws, &connect_frame(Some("tok-u1"))).await;

    assert_eq!(recv(&mut ws).await.command, Command::Connected);
}

#[tokio::test]
async fn test_malformed_frame_sends_error_and_closes() {
    let server = start_server(InterceptorConfig::default()).await;
    let mut ws = open(&server.addr, "").await;

    ws.send(Message::Text("HELLO\n\n\0".into())).await.unwrap();
    let reply = recv(&mut ws).await;

    assert_eq!(reply.command, Command::Error);
    assert!(reply.header(header::MESSAGE).unwrap().starts_with("malformed frame"));
    expect_closed(&mut ws).await;
}

#[tokio::test]
async fn test_duplicate_private_subscription_gets_error_and_stays_open() {
    let server = start_server(InterceptorConfig::default()).await;
    let mut alice = connected(&server.addr, "tok-u1").await;
    let mut bob = connected(&server.addr, "tok-u2").await;

    send(&mut alice, &subscribe_frame("/topic/private/room-1", "r-a")).await;
    let receipt = recv(&mut alice).await;
    assert_eq!(receipt.command, Command::Receipt);
    assert_eq!(receipt.header(header::RECEIPT_ID), Some("r-a"));

    send(&mut bob, &subscribe_frame("/topic/private/room-1", "r-b")).await;
    let refused = recv(&mut bob).await;
    assert_eq!(refused.command, Command::Error);
    assert_eq!(refused.header(header::RECEIPT_ID), Some("r-b"));
    assert!(refused.header(header::MESSAGE).unwrap().contains("room-1"));

    // Still usable after the refusal.
    send(&mut bob, &subscribe_frame("/topic/private/room-2", "r-c")).await;
    assert_eq!(recv(&mut bob).await.command, Command::Receipt);
    assert_eq!(server.registry.len(), 2);
}

#[tokio::test]
async fn test_subscribe_before_connect_gets_error() {
    let server = start_server(InterceptorConfig::default()).await;
    let mut ws = open(&server.addr, "?userId=U1").await;

    send(&mut ws, &subscribe_frame("/topic/private/room-1", "r-1")).await;
    let reply = recv(&mut ws).await;

    assert_eq!(reply.command, Command::Error);
    assert!(server.registry.is_empty());
}

#[tokio::test]
async fn test_disconnect_with_receipt_tears_down_and_closes() {
    let server = start_server(InterceptorConfig::default()).await;
    let mut ws = connected(&server.addr, "tok-u1").await;
    send(&mut ws, &subscribe_frame("/topic/private/room-1", "r-1")).await;
    recv(&mut ws).await;

    send(
        &mut ws,
        &Frame::new(Command::Disconnect).with_header(header::RECEIPT, "bye"),
    )
    .await;
    let receipt = recv(&mut ws).await;

    assert_eq!(receipt.command, Command::Receipt);
    assert_eq!(receipt.header(header::RECEIPT_ID), Some("bye"));
    expect_closed(&mut ws).await;
    assert!(server.cache.get("userinfo:U1").await.unwrap().is_none());
    assert!(server.registry.is_empty());
}

#[tokio::test]
async fn test_transport_close_without_disconnect_releases_session() {
    let server = start_server(InterceptorConfig::default()).await;
    let mut alice = connected(&server.addr, "tok-u1").await;
    send(&mut alice, &subscribe_frame("/topic/private/room-1", "r-1")).await;
    recv(&mut alice).await;

    alice.close(None).await.unwrap();
    drop(alice);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(server.registry.is_empty());
    assert!(server.cache.get("userinfo:U1").await.unwrap().is_none());

    let mut bob = connected(&server.addr, "tok-u2").await;
    send(&mut bob, &subscribe_frame("/topic/private/room-1", "r-2")).await;
    assert_eq!(recv(&mut bob).await.command, Command::Receipt);
}

#[tokio::test]
async fn test_idle_connection_is_closed_and_released() {
    let server = start_server(
        InterceptorConfig::default().idle_timeout(Duration::from_millis(200)),
    )
    .await;
    let mut ws = connected(&server.addr, "tok-u1").await;

    expect_closed(&mut ws).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(server.cache.get("userinfo:U1").await.unwrap().is_none());
}
