//! WebSocket server: accept loop and graceful shutdown.

mod connection;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::coordinator::CoordinatorHandle;
use crate::error::Result;

use connection::ConnectionParams;

/// The realtime endpoint: one WebSocket per client, coordinator behind it.
pub struct RealtimeServer {
    listener: TcpListener,
    coordinator: CoordinatorHandle,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
}

impl RealtimeServer {
    /// Bind the listener. The accept loop starts in [`run`](Self::run).
    pub async fn bind(config: &ServerConfig, coordinator: CoordinatorHandle) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "realtime server listening");
        Ok(Self {
            listener,
            coordinator,
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
        })
    }

    /// The bound address (useful when binding to port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the shutdown signal flips to `true`.
    ///
    /// Each accepted connection runs on its own task; live connections
    /// observe the same signal and close themselves.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let params = ConnectionParams {
            heartbeat_interval: self.heartbeat_interval,
            heartbeat_timeout: self.heartbeat_timeout,
        };
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let coordinator = self.coordinator.clone();
                            let shutdown = shutdown_rx.clone();
                            tokio::spawn(connection::serve(
                                stream,
                                peer,
                                coordinator,
                                params,
                                shutdown,
                            ));
                        }
                        Err(error) => warn!(%error, "accept failed"),
                    }
                }
            }
        }
        debug!("accept loop stopped");
    }
}
