//! In-memory store implementations.
//!
//! Backing for the dev server and the test suite. State lives behind
//! `tokio::sync::Mutex` so the stores can be shared across handlers; nothing
//! survives a process restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;

use super::{
    ChatMessage, MessageStore, NewChatMessage, NewNotification, Notification, NotificationStore,
    UserRecord, UserStore,
};

/// User records keyed by identity.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, replacing any existing one with the same id.
    pub async fn insert(&self, user: UserRecord) {
        self.users.lock().await.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find(&self, user_id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.lock().await.get(user_id).cloned())
    }

    async fn update(&self, user: UserRecord) -> Result<()> {
        self.users.lock().await.insert(user.id.clone(), user);
        Ok(())
    }
}

/// Append-only chat message log.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<ChatMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, message: NewChatMessage) -> Result<ChatMessage> {
        let stored = ChatMessage {
            id: Uuid::new_v4().to_string(),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            message: message.message,
            is_read: false,
            created_at: Utc::now(),
        };
        self.messages.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn conversation(&self, a: &str, b: &str) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.lock().await;
        Ok(messages
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b)
                    || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect())
    }
}

/// Notification log, newest first on query.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    notifications: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification> {
        let stored = Notification {
            id: Uuid::new_v4().to_string(),
            recipient_id: notification.recipient_id,
            sender_id: notification.sender_id,
            kind: notification.kind,
            text: notification.text,
            is_read: false,
            created_at: Utc::now(),
        };
        self.notifications.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn for_recipient(&self, user_id: &str) -> Result<Vec<Notification>> {
        let notifications = self.notifications.lock().await;
        let mut matching: Vec<Notification> = notifications
            .iter()
            .filter(|n| n.recipient_id == user_id)
            .cloned()
            .collect();
        matching.reverse();
        Ok(matching)
    }

    async fn delete_for_pair(&self, recipient_id: &str, sender_id: &str) -> Result<()> {
        self.notifications
            .lock()
            .await
            .retain(|n| !(n.recipient_id == recipient_id && n.sender_id == sender_id));
        Ok(())
    }
}
