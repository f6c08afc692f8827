//! Wire events for the realtime connection.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Client frames decode into [`ClientEvent`]; frames naming an event Beacon
//! does not recognize (or carrying a payload that does not fit the named
//! event) are logged and skipped rather than failing the connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::store::{ChatMessage, Notification};

/// Events a client may send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Announce the connection's user identity and register presence.
    #[serde(rename = "joinRoom")]
    JoinRoom(String),

    #[serde(rename = "startStream", rename_all = "camelCase")]
    StartStream { user_id: String },

    /// Payload is the broadcasting user identity.
    #[serde(rename = "stopStream")]
    StopStream(String),

    #[serde(rename = "joinStream", rename_all = "camelCase")]
    JoinStream { user_id: String, streamer_id: String },

    #[serde(rename = "leaveStream", rename_all = "camelCase")]
    LeaveStream { user_id: String, streamer_id: String },

    #[serde(rename = "offer")]
    Offer {
        sender: String,
        target: String,
        offer: Value,
    },

    #[serde(rename = "answer")]
    Answer {
        sender: String,
        target: String,
        answer: Value,
    },

    #[serde(rename = "ice-candidate")]
    IceCandidate {
        sender: String,
        target: String,
        candidate: Value,
    },

    #[serde(rename = "getActiveStreams")]
    GetActiveStreams,

    #[serde(rename = "getViewerCount", rename_all = "camelCase")]
    GetViewerCount { streamer_id: String },

    #[serde(rename = "sendMessage", rename_all = "camelCase")]
    SendMessage {
        sender_id: String,
        receiver_id: String,
        message: String,
    },

    #[serde(rename = "acceptRequest", rename_all = "camelCase")]
    AcceptRequest { user_id: String, sender_id: String },

    #[serde(rename = "rejectRequest", rename_all = "camelCase")]
    RejectRequest { user_id: String, sender_id: String },

    #[serde(rename = "follow", rename_all = "camelCase")]
    Follow {
        user_id: String,
        follow_user_id: String,
    },

    #[serde(rename = "unfollow", rename_all = "camelCase")]
    Unfollow {
        user_id: String,
        follow_user_id: String,
    },

    #[serde(rename = "mentorship-request", rename_all = "camelCase")]
    MentorshipRequest { user_id: String, mentor_id: String },

    #[serde(rename = "acceptMentorship", rename_all = "camelCase")]
    AcceptMentorship { user_id: String, mentee_id: String },

    #[serde(rename = "rejectMentorship", rename_all = "camelCase")]
    RejectMentorship { user_id: String, mentee_id: String },
}

impl ClientEvent {
    /// Decode a raw text frame.
    ///
    /// Returns `Ok(None)` for a structurally valid frame that names an
    /// unrecognized event or carries a payload that does not match; the frame
    /// is dropped, not the connection. Non-JSON input is an error.
    pub fn decode(raw: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(raw)?;
        match serde_json::from_value::<Self>(value.clone()) {
            Ok(event) => Ok(Some(event)),
            Err(error) => {
                let name = value
                    .get("event")
                    .and_then(Value::as_str)
                    .unwrap_or("<missing>");
                warn!(event = name, %error, "dropping unrecognized client frame");
                Ok(None)
            }
        }
    }
}

/// One live broadcast in an `activeStreams` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStream {
    pub user_id: String,
    pub stream_id: String,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full presence snapshot, broadcast to every connection.
    #[serde(rename = "activeUsers")]
    ActiveUsers(Vec<String>),

    #[serde(rename = "streamStarted", rename_all = "camelCase")]
    StreamStarted { user_id: String, stream_id: String },

    #[serde(rename = "streamEnded", rename_all = "camelCase")]
    StreamEnded { user_id: String },

    #[serde(rename = "viewerJoined", rename_all = "camelCase")]
    ViewerJoined { viewer_user_id: String },

    #[serde(rename = "viewerLeft", rename_all = "camelCase")]
    ViewerLeft { viewer_user_id: String },

    #[serde(rename = "viewerCount", rename_all = "camelCase")]
    ViewerCount {
        streamer_user_id: String,
        count: usize,
    },

    #[serde(rename = "offer")]
    Offer { sender: String, offer: Value },

    #[serde(rename = "answer")]
    Answer { sender: String, answer: Value },

    #[serde(rename = "ice-candidate")]
    IceCandidate { sender: String, candidate: Value },

    /// Snapshot reply to `getActiveStreams`, sent to the requester only.
    #[serde(rename = "activeStreams")]
    ActiveStreams(Vec<ActiveStream>),

    #[serde(rename = "receiveMessage")]
    ReceiveMessage(ChatMessage),

    #[serde(rename = "newNotification")]
    NewNotification(Notification),
}

impl ServerEvent {
    /// Encode for the wire.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
