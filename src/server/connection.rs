//! Per-connection frame pump.
//!
//! One task per accepted socket: inbound frames decode into client events and
//! go to the coordinator, outbound events arrive on the connection's channel
//! and are written back, and a server-initiated heartbeat detects dead peers.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, warn};

use crate::coordinator::{ConnectionId, CoordinatorHandle};
use crate::events::{ClientEvent, ServerEvent};

#[derive(Clone, Copy)]
pub(super) struct ConnectionParams {
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

pub(super) async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    coordinator: CoordinatorHandle,
    params: ConnectionParams,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut socket = match accept_async(stream).await {
        Ok(socket) => socket,
        Err(error) => {
            warn!(%peer, %error, "websocket handshake failed");
            return;
        }
    };

    let connection = ConnectionId::new();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    if coordinator.connect(connection, outbound_tx).is_err() {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    debug!(%connection, %peer, "connection established");

    run_pump(
        &mut socket,
        connection,
        &coordinator,
        &mut outbound_rx,
        &mut shutdown_rx,
        params,
    )
    .await;

    // Cleanup runs regardless of how the pump exited.
    if coordinator.disconnect(connection).is_err() {
        debug!(%connection, "coordinator already stopped during disconnect");
    }
    let _ = socket.send(Message::Close(None)).await;
    debug!(%connection, %peer, "connection closed");
}

async fn run_pump(
    socket: &mut WebSocketStream<TcpStream>,
    connection: ConnectionId,
    coordinator: &CoordinatorHandle,
    outbound_rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
    params: ConnectionParams,
) {
    let mut heartbeat = time::interval(params.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
            _ = heartbeat.tick() => {
                if last_pong.elapsed() > params.heartbeat_timeout {
                    warn!(%connection, "heartbeat timeout, disconnecting");
                    return;
                }
                if socket.send(Message::Ping(Default::default())).await.is_err() {
                    return;
                }
            }
            outbound = outbound_rx.recv() => {
                let Some(event) = outbound else {
                    return;
                };
                match event.encode() {
                    Ok(frame) => {
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            return;
                        }
                    }
                    Err(error) => warn!(%connection, %error, "failed to encode outbound event"),
                }
            }
            frame = socket.next() => {
                match frame {
                    Some(Ok(message)) => {
                        if !handle_frame(socket, connection, coordinator, message, &mut last_pong)
                            .await
                        {
                            return;
                        }
                    }
                    Some(Err(error)) => {
                        debug!(%connection, %error, "websocket receive failed");
                        return;
                    }
                    None => return,
                }
            }
        }
    }
}

/// Process one inbound frame; returns `false` when the pump should stop.
async fn handle_frame(
    socket: &mut WebSocketStream<TcpStream>,
    connection: ConnectionId,
    coordinator: &CoordinatorHandle,
    message: Message,
    last_pong: &mut Instant,
) -> bool {
    match message {
        Message::Text(text) => dispatch_frame(connection, coordinator, text.as_ref()),
        Message::Binary(bytes) => {
            if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                dispatch_frame(connection, coordinator, &text)
            } else {
                warn!(%connection, "dropping non-UTF-8 binary frame");
                true
            }
        }
        Message::Ping(payload) => socket.send(Message::Pong(payload)).await.is_ok(),
        Message::Pong(_) => {
            *last_pong = Instant::now();
            true
        }
        Message::Close(_) => false,
        Message::Frame(_) => true,
    }
}

/// Decode and forward one text payload; returns `false` only when the
/// coordinator is gone.
fn dispatch_frame(connection: ConnectionId, coordinator: &CoordinatorHandle, raw: &str) -> bool {
    match ClientEvent::decode(raw) {
        Ok(Some(event)) => coordinator.dispatch(connection, event).is_ok(),
        Ok(None) => true,
        Err(error) => {
            warn!(%connection, %error, "ignoring malformed frame");
            true
        }
    }
}
