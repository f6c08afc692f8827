//! End-to-end tests: real listener, real WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use beacon::config::ServerConfig;
use beacon::coordinator::Coordinator;
use beacon::server::RealtimeServer;
use beacon::store::memory::{InMemoryMessageStore, InMemoryNotificationStore, InMemoryUserStore};
use beacon::store::{MessageStore, UserRecord, UserStore};

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    users: Arc<InMemoryUserStore>,
    messages: Arc<InMemoryMessageStore>,
}

async fn start_server() -> TestServer {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        heartbeat_secs: 1,
        heartbeat_timeout_secs: 30,
    };
    let users = Arc::new(InMemoryUserStore::new());
    let messages = Arc::new(InMemoryMessageStore::new());
    let notifications = Arc::new(InMemoryNotificationStore::new());
    let coordinator = Coordinator::new(users.clone(), messages.clone(), notifications.clone());
    let (handle, _coordinator_task) = coordinator.spawn();

    let server = RealtimeServer::bind(&config, handle)
        .await
        .expect("server should bind");
    let addr = server.local_addr().expect("local addr should be available");
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.run(shutdown_rx));

    TestServer {
        addr,
        shutdown,
        users,
        messages,
    }
}

async fn connect_client(addr: SocketAddr) -> ClientSocket {
    let (socket, _) = connect_async(format!("ws://{addr}"))
        .await
        .expect("client should connect");
    socket
}

async fn send_frame(socket: &mut ClientSocket, frame: Value) {
    socket
        .send(Message::Text(frame.to_string().into()))
        .await
        .expect("frame should send");
}

/// Read frames until one satisfies the predicate, skipping pings and
/// unrelated events.
async fn wait_for_frame<F>(socket: &mut ClientSocket, max_wait: Duration, mut predicate: F) -> Value
where
    F: FnMut(&Value) -> bool,
{
    let deadline = Instant::now() + max_wait;
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("frame did not arrive before timeout");
        let message = timeout(remaining, socket.next())
            .await
            .expect("waiting for frame should not timeout")
            .expect("socket should stay open")
            .expect("frame should parse");
        if let Message::Text(text) = message {
            let value: Value =
                serde_json::from_str(text.as_ref()).expect("server frame should be JSON");
            if predicate(&value) {
                return value;
            }
        }
    }
}

fn event_named<'v>(value: &'v Value, name: &str) -> Option<&'v Value> {
    (value.get("event").and_then(Value::as_str) == Some(name)).then(|| &value["data"])
}

async fn join(socket: &mut ClientSocket, user_id: &str) {
    send_frame(socket, json!({"event": "joinRoom", "data": user_id})).await;
    wait_for_frame(socket, Duration::from_secs(1), |value| {
        event_named(value, "activeUsers")
            .and_then(Value::as_array)
            .is_some_and(|users| users.contains(&Value::String(user_id.to_string())))
    })
    .await;
}

#[tokio::test]
async fn join_broadcasts_presence_to_every_connection() {
    let server = start_server().await;
    let mut alice = connect_client(server.addr).await;
    let mut bob = connect_client(server.addr).await;

    join(&mut alice, "alice").await;
    join(&mut bob, "bob").await;

    // Bob's join is broadcast to Alice's already-open connection too.
    let frame = wait_for_frame(&mut alice, Duration::from_secs(1), |value| {
        event_named(value, "activeUsers")
            .and_then(Value::as_array)
            .is_some_and(|users| users.contains(&Value::String("bob".to_string())))
    })
    .await;
    let users = frame["data"].as_array().expect("data should be an array");
    assert!(users.contains(&Value::String("alice".to_string())));
}

#[tokio::test]
async fn chat_message_is_persisted_then_delivered() {
    let server = start_server().await;
    let mut alice = connect_client(server.addr).await;
    let mut bob = connect_client(server.addr).await;
    join(&mut alice, "alice").await;
    join(&mut bob, "bob").await;

    send_frame(
        &mut alice,
        json!({"event": "sendMessage", "data": {
            "senderId": "alice",
            "receiverId": "bob",
            "message": "hi",
        }}),
    )
    .await;

    let frame = wait_for_frame(&mut bob, Duration::from_secs(1), |value| {
        event_named(value, "receiveMessage").is_some()
    })
    .await;
    assert_eq!(frame["data"]["message"], "hi");
    assert_eq!(frame["data"]["senderId"], "alice");
    assert_eq!(frame["data"]["isRead"], false);

    let stored = server
        .messages
        .conversation("alice", "bob")
        .await
        .expect("conversation query should succeed");
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].is_read);
}

#[tokio::test]
async fn stream_lifecycle_over_the_wire() {
    let server = start_server().await;
    let mut alice = connect_client(server.addr).await;
    let mut bob = connect_client(server.addr).await;
    join(&mut alice, "alice").await;
    join(&mut bob, "bob").await;

    send_frame(
        &mut alice,
        json!({"event": "startStream", "data": {"userId": "alice"}}),
    )
    .await;
    let started = wait_for_frame(&mut bob, Duration::from_secs(1), |value| {
        event_named(value, "streamStarted").is_some()
    })
    .await;
    assert_eq!(started["data"]["userId"], "alice");
    let stream_id = started["data"]["streamId"]
        .as_str()
        .expect("streamId should be a string")
        .to_string();
    assert!(stream_id.starts_with("alice-"));

    send_frame(
        &mut bob,
        json!({"event": "joinStream", "data": {"userId": "bob", "streamerId": "alice"}}),
    )
    .await;
    wait_for_frame(&mut alice, Duration::from_secs(1), |value| {
        event_named(value, "viewerJoined")
            .is_some_and(|data| data["viewerUserId"] == "bob")
    })
    .await;
    let count = wait_for_frame(&mut bob, Duration::from_secs(1), |value| {
        event_named(value, "viewerCount").is_some()
    })
    .await;
    assert_eq!(count["data"]["count"], 1);

    send_frame(&mut alice, json!({"event": "stopStream", "data": "alice"})).await;
    // One targeted streamEnded for the viewer plus the global broadcast.
    for _ in 0..2 {
        wait_for_frame(&mut bob, Duration::from_secs(1), |value| {
            event_named(value, "streamEnded")
                .is_some_and(|data| data["userId"] == "alice")
        })
        .await;
    }
}

#[tokio::test]
async fn disconnect_removes_user_from_presence() {
    let server = start_server().await;
    let mut alice = connect_client(server.addr).await;
    let mut bob = connect_client(server.addr).await;
    join(&mut alice, "alice").await;
    join(&mut bob, "bob").await;

    alice.close(None).await.expect("close should send");

    let frame = wait_for_frame(&mut bob, Duration::from_secs(2), |value| {
        event_named(value, "activeUsers")
            .and_then(Value::as_array)
            .is_some_and(|users| !users.contains(&Value::String("alice".to_string())))
    })
    .await;
    assert_eq!(frame["data"], json!(["bob"]));
}

#[tokio::test]
async fn accept_request_notifies_the_requester_over_the_wire() {
    let server = start_server().await;
    let mut bob = UserRecord::new("bob");
    bob.connection_requests.push("alice".to_string());
    server.users.insert(bob).await;
    server.users.insert(UserRecord::new("alice")).await;

    let mut alice = connect_client(server.addr).await;
    join(&mut alice, "alice").await;

    send_frame(
        &mut alice,
        json!({"event": "acceptRequest", "data": {"userId": "bob", "senderId": "alice"}}),
    )
    .await;

    let frame = wait_for_frame(&mut alice, Duration::from_secs(1), |value| {
        event_named(value, "newNotification").is_some()
    })
    .await;
    assert_eq!(frame["data"]["senderId"], "bob");
    assert_eq!(frame["data"]["type"], "connectionAccepted");

    let bob = server
        .users
        .find("bob")
        .await
        .expect("find should succeed")
        .expect("bob should exist");
    assert!(bob.connections.contains(&"alice".to_string()));
}

#[tokio::test]
async fn server_pings_idle_connections() {
    let server = start_server().await;
    let mut client = connect_client(server.addr).await;

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut ping_seen = false;
    while Instant::now() < deadline {
        match timeout(Duration::from_millis(200), client.next()).await {
            Ok(Some(Ok(Message::Ping(_)))) => {
                ping_seen = true;
                break;
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => {}
        }
    }
    assert!(ping_seen, "server should ping within the heartbeat interval");
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_connection() {
    let server = start_server().await;
    let mut client = connect_client(server.addr).await;

    client
        .send(Message::Text("not json".to_string().into()))
        .await
        .expect("frame should send");
    client
        .send(Message::Text(
            json!({"event": "noSuchEvent", "data": 1}).to_string().into(),
        ))
        .await
        .expect("frame should send");

    // The connection still works afterwards.
    join(&mut client, "alice").await;
}

#[tokio::test]
async fn shutdown_closes_active_connections() {
    let server = start_server().await;
    let mut client = connect_client(server.addr).await;
    join(&mut client, "alice").await;

    server
        .shutdown
        .send(true)
        .expect("shutdown signal should send");

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        assert!(
            Instant::now() < deadline,
            "connection should close after shutdown"
        );
        match timeout(Duration::from_millis(200), client.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(_))) => {}
            Err(_) => {}
        }
    }
}
