//! Persistence collaborator traits and the entities they own.
//!
//! Beacon never caches durable state across calls: the stores are the single
//! source of truth for users, chat messages, and notifications. Concrete
//! backends implement the traits below; [`memory`] provides the in-process
//! implementations used by the dev server and the test suite.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A user record with its relationship lists and leveling fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default)]
    pub connection_requests: Vec<String>,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
    #[serde(default)]
    pub points: u32,
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    1
}

impl UserRecord {
    /// Create a fresh record with empty relationship lists.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connections: Vec::new(),
            connection_requests: Vec::new(),
            followers: Vec::new(),
            following: Vec::new(),
            points: 0,
            level: 1,
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a chat message; the store assigns id, read flag, and
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub message: String,
}

/// Category tag on a notification, named after the social action that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum NotificationKind {
    ConnectionAccepted,
    ConnectionRejected,
    Follow,
    Unfollow,
    MentorshipRequest,
    MentorshipAccepted,
    MentorshipRejected,
}

/// A persisted notification addressed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub text: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient_id: String,
    pub sender_id: String,
    pub kind: NotificationKind,
    pub text: String,
}

/// User lookup and mutation.
///
/// Relationship changes are read-modify-write through `find` + `update`; the
/// race between two near-simultaneous mutations of the same record across the
/// await point is an accepted, documented risk.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by identity. `Ok(None)` when the user does not exist.
    async fn find(&self, user_id: &str) -> Result<Option<UserRecord>>;

    /// Persist the full record, replacing the stored one.
    async fn update(&self, user: UserRecord) -> Result<()>;
}

/// Chat message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message and return the stored record.
    async fn create(&self, message: NewChatMessage) -> Result<ChatMessage>;

    /// All messages exchanged between the two participants, oldest first.
    async fn conversation(&self, a: &str, b: &str) -> Result<Vec<ChatMessage>>;
}

/// Notification persistence.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new notification and return the stored record.
    async fn create(&self, notification: NewNotification) -> Result<Notification>;

    /// All notifications addressed to a recipient, newest first.
    async fn for_recipient(&self, user_id: &str) -> Result<Vec<Notification>>;

    /// Delete every notification from `sender_id` addressed to `recipient_id`.
    async fn delete_for_pair(&self, recipient_id: &str, sender_id: &str) -> Result<()>;
}
