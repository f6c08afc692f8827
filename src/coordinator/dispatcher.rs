//! Chat and social-graph notification dispatch.
//!
//! Every handler persists through the collaborator stores before any event is
//! forwarded: a recipient never observes a message or notification that has
//! not been committed. The reverse is not guaranteed; a relationship change
//! can persist without its notification when the notification write fails.
//! Known consistency gap, accepted.

use tracing::{debug, error, warn};

use crate::error::{BeaconError, Result};
use crate::events::ServerEvent;
use crate::levels;
use crate::store::{NewChatMessage, NewNotification, NotificationKind, UserRecord};

use super::Coordinator;

impl Coordinator {
    /// Persist a chat message, then deliver it to every session of the
    /// receiver. The sender renders its own copy optimistically and gets no
    /// echo.
    pub(super) async fn handle_send_message(
        &mut self,
        sender_id: String,
        receiver_id: String,
        message: String,
    ) {
        if sender_id.trim().is_empty()
            || receiver_id.trim().is_empty()
            || sender_id == receiver_id
        {
            warn!(%sender_id, %receiver_id, "sendMessage with invalid participants dropped");
            return;
        }
        match self
            .messages
            .create(NewChatMessage {
                sender_id: sender_id.clone(),
                receiver_id: receiver_id.clone(),
                message,
            })
            .await
        {
            Ok(stored) => {
                self.send_to_user(&receiver_id, &ServerEvent::ReceiveMessage(stored));
            }
            Err(store_error) => {
                error!(%store_error, %sender_id, %receiver_id, "chat message persistence failed");
            }
        }
    }

    /// `userId` accepts the pending request from `senderId`: both gain a
    /// connection, the request entry is cleared, both earn the point bonus,
    /// and the requester is notified.
    pub(super) async fn handle_accept_request(
        &mut self,
        user_id: &str,
        sender_id: &str,
    ) -> Result<()> {
        let (mut accepter, mut requester) = self.load_pair(user_id, sender_id).await?;

        accepter.connection_requests.retain(|id| id != sender_id);
        push_unique(&mut accepter.connections, sender_id);
        push_unique(&mut requester.connections, user_id);
        levels::award_connection_bonus(&mut accepter);
        levels::award_connection_bonus(&mut requester);

        self.users.update(accepter).await?;
        self.users.update(requester).await?;

        self.notify(
            sender_id,
            user_id,
            NotificationKind::ConnectionAccepted,
            format!("{user_id} accepted your connection request"),
        )
        .await
    }

    /// `userId` declines the pending request from `senderId`.
    pub(super) async fn handle_reject_request(
        &mut self,
        user_id: &str,
        sender_id: &str,
    ) -> Result<()> {
        let (mut rejecter, _requester) = self.load_pair(user_id, sender_id).await?;

        rejecter.connection_requests.retain(|id| id != sender_id);
        self.users.update(rejecter).await?;

        self.notify(
            sender_id,
            user_id,
            NotificationKind::ConnectionRejected,
            format!("{user_id} declined your connection request"),
        )
        .await
    }

    /// Notify-only: the follow graph itself is mutated by the REST layer.
    pub(super) async fn handle_follow(&mut self, user_id: &str, follow_user_id: &str) -> Result<()> {
        self.load_pair(user_id, follow_user_id).await?;
        self.notify(
            follow_user_id,
            user_id,
            NotificationKind::Follow,
            format!("{user_id} started following you"),
        )
        .await
    }

    /// Notify-only, and the stale follow notification for the pair is
    /// retracted from the store first.
    pub(super) async fn handle_unfollow(
        &mut self,
        user_id: &str,
        follow_user_id: &str,
    ) -> Result<()> {
        self.load_pair(user_id, follow_user_id).await?;
        self.notifications
            .delete_for_pair(follow_user_id, user_id)
            .await?;
        self.notify(
            follow_user_id,
            user_id,
            NotificationKind::Unfollow,
            format!("{user_id} unfollowed you"),
        )
        .await
    }

    pub(super) async fn handle_mentorship_request(
        &mut self,
        user_id: &str,
        mentor_id: &str,
    ) -> Result<()> {
        self.load_pair(user_id, mentor_id).await?;
        self.notify(
            mentor_id,
            user_id,
            NotificationKind::MentorshipRequest,
            format!("{user_id} sent you a mentorship request"),
        )
        .await
    }

    pub(super) async fn handle_accept_mentorship(
        &mut self,
        user_id: &str,
        mentee_id: &str,
    ) -> Result<()> {
        self.load_pair(user_id, mentee_id).await?;
        self.notify(
            mentee_id,
            user_id,
            NotificationKind::MentorshipAccepted,
            format!("{user_id} accepted your mentorship request"),
        )
        .await
    }

    pub(super) async fn handle_reject_mentorship(
        &mut self,
        user_id: &str,
        mentee_id: &str,
    ) -> Result<()> {
        self.load_pair(user_id, mentee_id).await?;
        self.notify(
            mentee_id,
            user_id,
            NotificationKind::MentorshipRejected,
            format!("{user_id} declined your mentorship request"),
        )
        .await
    }

    /// Resolve both identities to existing records, rejecting missing or
    /// self-referential pairs before any mutation happens.
    async fn load_pair(&self, first: &str, second: &str) -> Result<(UserRecord, UserRecord)> {
        if first.trim().is_empty() || second.trim().is_empty() {
            return Err(BeaconError::InvalidArgument(
                "both user identities are required".into(),
            ));
        }
        if first == second {
            return Err(BeaconError::InvalidArgument(format!(
                "self-referential event for '{first}'"
            )));
        }
        let first_record = self
            .users
            .find(first)
            .await?
            .ok_or_else(|| BeaconError::UserNotFound(first.to_string()))?;
        let second_record = self
            .users
            .find(second)
            .await?
            .ok_or_else(|| BeaconError::UserNotFound(second.to_string()))?;
        Ok((first_record, second_record))
    }

    /// Create the notification, then push it to every session of the
    /// recipient. Creation always precedes delivery.
    async fn notify(
        &self,
        recipient_id: &str,
        sender_id: &str,
        kind: NotificationKind,
        text: String,
    ) -> Result<()> {
        let stored = self
            .notifications
            .create(NewNotification {
                recipient_id: recipient_id.to_string(),
                sender_id: sender_id.to_string(),
                kind,
                text,
            })
            .await?;
        debug!(kind = %stored.kind, recipient_id, "notification created and delivered");
        self.send_to_user(recipient_id, &ServerEvent::NewNotification(stored));
        Ok(())
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}
