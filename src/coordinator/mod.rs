//! Realtime coordinator actor.
//!
//! A single spawned task owns every mutable registry: the session table, the
//! presence set, and the live-stream map. Connections submit [`Command`]s
//! over an unbounded channel and receive [`ServerEvent`]s over per-connection
//! outbound channels registered at connect time. Commands are processed one
//! at a time; a handler that awaits a persistence collaborator suspends while
//! later commands queue behind it, so no two mutations of the registries ever
//! interleave.

mod dispatcher;
mod presence;
mod signaling;
mod streams;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BeaconError, Result};
use crate::events::{ClientEvent, ServerEvent};
use crate::store::{MessageStore, NotificationStore, UserStore};

use presence::PresenceRegistry;
use streams::StreamRegistry;

/// Identifier of one realtime connection, assigned at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Commands accepted by the coordinator task.
pub(crate) enum Command {
    Connect {
        connection: ConnectionId,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Client {
        connection: ConnectionId,
        event: ClientEvent,
    },
}

/// Clonable handle for submitting commands to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Register a new connection and its outbound event channel.
    pub fn connect(
        &self,
        connection: ConnectionId,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<()> {
        self.submit(Command::Connect {
            connection,
            outbound,
        })
    }

    /// Tear down a connection: presence removal plus stream/viewer cleanup.
    pub fn disconnect(&self, connection: ConnectionId) -> Result<()> {
        self.submit(Command::Disconnect { connection })
    }

    /// Submit a decoded client event for processing.
    pub fn dispatch(&self, connection: ConnectionId, event: ClientEvent) -> Result<()> {
        self.submit(Command::Client { connection, event })
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| BeaconError::InvalidState("Coordinator is not running".into()))
    }
}

/// The coordinator: owns the registries and the persistence collaborators.
pub struct Coordinator {
    presence: PresenceRegistry,
    streams: StreamRegistry,
    users: Arc<dyn UserStore>,
    messages: Arc<dyn MessageStore>,
    notifications: Arc<dyn NotificationStore>,
}

impl Coordinator {
    pub fn new(
        users: Arc<dyn UserStore>,
        messages: Arc<dyn MessageStore>,
        notifications: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            presence: PresenceRegistry::default(),
            streams: StreamRegistry::default(),
            users,
            messages,
            notifications,
        }
    }

    /// Spawn the coordinator task. The task drains commands until every
    /// handle is dropped.
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(commands_rx));
        (
            CoordinatorHandle {
                commands: commands_tx,
            },
            task,
        )
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            self.handle_command(command).await;
        }
        debug!("coordinator stopped; all handles dropped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect {
                connection,
                outbound,
            } => {
                debug!(%connection, "connection registered");
                self.presence.insert_session(connection, outbound);
            }
            Command::Disconnect { connection } => self.handle_disconnect(connection),
            Command::Client { connection, event } => {
                self.handle_client_event(connection, event).await;
            }
        }
    }

    async fn handle_client_event(&mut self, connection: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom(user_id) => self.handle_join_room(connection, user_id),
            ClientEvent::StartStream { user_id } => self.handle_start_stream(connection, user_id),
            ClientEvent::StopStream(user_id) => self.handle_stop_stream(&user_id),
            ClientEvent::JoinStream {
                user_id,
                streamer_id,
            } => self.handle_join_stream(&user_id, &streamer_id),
            ClientEvent::LeaveStream {
                user_id,
                streamer_id,
            } => self.handle_leave_stream(&user_id, &streamer_id),
            ClientEvent::Offer {
                sender,
                target,
                offer,
            } => signaling::relay_signal(&self.presence, &target, ServerEvent::Offer {
                sender,
                offer,
            }),
            ClientEvent::Answer {
                sender,
                target,
                answer,
            } => signaling::relay_signal(&self.presence, &target, ServerEvent::Answer {
                sender,
                answer,
            }),
            ClientEvent::IceCandidate {
                sender,
                target,
                candidate,
            } => signaling::relay_signal(&self.presence, &target, ServerEvent::IceCandidate {
                sender,
                candidate,
            }),
            ClientEvent::GetActiveStreams => {
                let snapshot = self.streams.snapshot();
                self.send_to_connection(connection, ServerEvent::ActiveStreams(snapshot));
            }
            ClientEvent::GetViewerCount { streamer_id } => {
                let count = self.streams.viewer_count(&streamer_id);
                self.send_to_connection(
                    connection,
                    ServerEvent::ViewerCount {
                        streamer_user_id: streamer_id,
                        count,
                    },
                );
            }
            ClientEvent::SendMessage {
                sender_id,
                receiver_id,
                message,
            } => self.handle_send_message(sender_id, receiver_id, message).await,
            ClientEvent::AcceptRequest { user_id, sender_id } => {
                if let Err(error) = self.handle_accept_request(&user_id, &sender_id).await {
                    log_event_failure("acceptRequest", &error);
                }
            }
            ClientEvent::RejectRequest { user_id, sender_id } => {
                if let Err(error) = self.handle_reject_request(&user_id, &sender_id).await {
                    log_event_failure("rejectRequest", &error);
                }
            }
            ClientEvent::Follow {
                user_id,
                follow_user_id,
            } => {
                if let Err(error) = self.handle_follow(&user_id, &follow_user_id).await {
                    log_event_failure("follow", &error);
                }
            }
            ClientEvent::Unfollow {
                user_id,
                follow_user_id,
            } => {
                if let Err(error) = self.handle_unfollow(&user_id, &follow_user_id).await {
                    log_event_failure("unfollow", &error);
                }
            }
            ClientEvent::MentorshipRequest { user_id, mentor_id } => {
                if let Err(error) = self.handle_mentorship_request(&user_id, &mentor_id).await {
                    log_event_failure("mentorship-request", &error);
                }
            }
            ClientEvent::AcceptMentorship { user_id, mentee_id } => {
                if let Err(error) = self.handle_accept_mentorship(&user_id, &mentee_id).await {
                    log_event_failure("acceptMentorship", &error);
                }
            }
            ClientEvent::RejectMentorship { user_id, mentee_id } => {
                if let Err(error) = self.handle_reject_mentorship(&user_id, &mentee_id).await {
                    log_event_failure("rejectMentorship", &error);
                }
            }
        }
    }

    // -- Presence --

    fn handle_join_room(&mut self, connection: ConnectionId, user_id: String) {
        if user_id.trim().is_empty() {
            debug!(%connection, "join with empty identity accepted but ignored");
            return;
        }
        if !self.presence.announce(connection, user_id.clone()) {
            warn!(%connection, %user_id, "join from unregistered connection");
            return;
        }
        self.broadcast_presence();
    }

    fn handle_disconnect(&mut self, connection: ConnectionId) {
        let Some(session) = self.presence.remove_session(connection) else {
            return;
        };

        // Implicit stopStream for broadcasts owned by this connection.
        for record in self.streams.stop_owned_by(connection) {
            self.emit_stream_ended(&record.owner, &record.viewers);
        }

        let Some(user_id) = session.user_id().map(str::to_string) else {
            return;
        };

        // Implicit leaveStream for every record this user was viewing.
        for owner in self.streams.owners_viewed_by(&user_id) {
            if let Some((owner_connection, count)) = self.streams.leave(&user_id, &owner) {
                self.send_to_connection(
                    owner_connection,
                    ServerEvent::ViewerLeft {
                        viewer_user_id: user_id.clone(),
                    },
                );
                self.broadcast(&ServerEvent::ViewerCount {
                    streamer_user_id: owner,
                    count,
                });
            }
        }

        if self.presence.remove_user(&user_id) {
            self.broadcast_presence();
        }
    }

    // -- Live streams --

    fn handle_start_stream(&mut self, connection: ConnectionId, user_id: String) {
        if user_id.trim().is_empty() {
            debug!(%connection, "startStream with empty identity ignored");
            return;
        }
        let stream_id = self.streams.start(user_id.clone(), connection);
        self.broadcast(&ServerEvent::StreamStarted { user_id, stream_id });
    }

    fn handle_stop_stream(&mut self, user_id: &str) {
        match self.streams.stop(user_id) {
            Some(record) => self.emit_stream_ended(&record.owner, &record.viewers),
            None => debug!(user_id, "stopStream for a user that is not live"),
        }
    }

    fn handle_join_stream(&mut self, viewer: &str, streamer: &str) {
        match self.streams.join(viewer, streamer) {
            Some((streamer_connection, count)) => {
                self.send_to_connection(
                    streamer_connection,
                    ServerEvent::ViewerJoined {
                        viewer_user_id: viewer.to_string(),
                    },
                );
                self.broadcast(&ServerEvent::ViewerCount {
                    streamer_user_id: streamer.to_string(),
                    count,
                });
            }
            None => debug!(viewer, streamer, "joinStream for a stream that is not live"),
        }
    }

    fn handle_leave_stream(&mut self, viewer: &str, streamer: &str) {
        match self.streams.leave(viewer, streamer) {
            Some((streamer_connection, count)) => {
                self.send_to_connection(
                    streamer_connection,
                    ServerEvent::ViewerLeft {
                        viewer_user_id: viewer.to_string(),
                    },
                );
                self.broadcast(&ServerEvent::ViewerCount {
                    streamer_user_id: streamer.to_string(),
                    count,
                });
            }
            None => debug!(viewer, streamer, "leaveStream without a matching viewer entry"),
        }
    }

    /// Targeted `streamEnded` to each viewer, then the global broadcast.
    fn emit_stream_ended(&self, owner: &str, viewers: &std::collections::HashSet<String>) {
        let event = ServerEvent::StreamEnded {
            user_id: owner.to_string(),
        };
        for viewer in viewers {
            self.send_to_user(viewer, &event);
        }
        self.broadcast(&event);
    }

    // -- Delivery helpers --

    fn broadcast_presence(&self) {
        self.broadcast(&ServerEvent::ActiveUsers(self.presence.online_users()));
    }

    fn broadcast(&self, event: &ServerEvent) {
        for session in self.presence.sessions() {
            session.send(event.clone());
        }
    }

    fn send_to_user(&self, user_id: &str, event: &ServerEvent) {
        for session in self.presence.sessions_for_user(user_id) {
            session.send(event.clone());
        }
    }

    fn send_to_connection(&self, connection: ConnectionId, event: ServerEvent) {
        if let Some(session) = self.presence.session(connection) {
            session.send(event);
        }
    }
}

/// Per-event failures are isolated: validation and lookup gaps are expected
/// traffic, collaborator failures are operational errors. Nothing is fatal.
fn log_event_failure(event: &'static str, error: &BeaconError) {
    match error {
        BeaconError::UserNotFound(_) | BeaconError::InvalidArgument(_) => {
            warn!(%error, event, "event dropped");
        }
        _ => tracing::error!(%error, event, "event aborted"),
    }
}
