//! Session table and process-wide presence set.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;

use crate::events::ServerEvent;

use super::ConnectionId;

/// One realtime connection known to the coordinator.
///
/// The user identity is set once via an explicit join and the outbound
/// channel is the only way events reach the connection.
pub(crate) struct Session {
    user_id: Option<String>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl Session {
    /// Queue an event for the connection's writer task.
    ///
    /// A closed channel means the connection is already tearing down; the
    /// event is silently discarded.
    pub(crate) fn send(&self, event: ServerEvent) {
        let _ = self.outbound.send(event);
    }

    pub(crate) fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// Registry of live sessions plus the set of announced user identities.
#[derive(Default)]
pub(crate) struct PresenceRegistry {
    sessions: HashMap<ConnectionId, Session>,
    online: HashSet<String>,
}

impl PresenceRegistry {
    pub(crate) fn insert_session(
        &mut self,
        connection: ConnectionId,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.sessions.insert(
            connection,
            Session {
                user_id: None,
                outbound,
            },
        );
    }

    pub(crate) fn remove_session(&mut self, connection: ConnectionId) -> Option<Session> {
        self.sessions.remove(&connection)
    }

    /// Associate a session with a user identity and mark it online.
    ///
    /// Idempotent on the presence set. Returns `false` when the connection is
    /// not registered.
    pub(crate) fn announce(&mut self, connection: ConnectionId, user_id: String) -> bool {
        let Some(session) = self.sessions.get_mut(&connection) else {
            return false;
        };
        session.user_id = Some(user_id.clone());
        self.online.insert(user_id);
        true
    }

    /// Drop a user identity from the presence set. Returns whether it was
    /// present.
    pub(crate) fn remove_user(&mut self, user_id: &str) -> bool {
        self.online.remove(user_id)
    }

    /// Snapshot of announced identities, sorted for stable broadcasts.
    pub(crate) fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.online.iter().cloned().collect();
        users.sort();
        users
    }

    pub(crate) fn is_online(&self, user_id: &str) -> bool {
        self.online.contains(user_id)
    }

    pub(crate) fn session(&self, connection: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection)
    }

    pub(crate) fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Every session announced as `user_id` (a user may hold several tabs).
    pub(crate) fn sessions_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> impl Iterator<Item = &'a Session> {
        self.sessions
            .values()
            .filter(move |session| session.user_id() == Some(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(registry: &mut PresenceRegistry) -> ConnectionId {
        let connection = ConnectionId::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.insert_session(connection, tx);
        connection
    }

    #[test]
    fn announce_is_idempotent_on_the_presence_set() {
        let mut registry = PresenceRegistry::default();
        let first = registered(&mut registry);
        let second = registered(&mut registry);

        assert!(registry.announce(first, "alice".into()));
        assert!(registry.announce(second, "alice".into()));

        assert_eq!(registry.online_users(), vec!["alice".to_string()]);
    }

    #[test]
    fn announce_unknown_connection_is_rejected() {
        let mut registry = PresenceRegistry::default();
        assert!(!registry.announce(ConnectionId::new(), "alice".into()));
        assert!(registry.online_users().is_empty());
    }

    #[test]
    fn remove_user_reports_prior_presence() {
        let mut registry = PresenceRegistry::default();
        let connection = registered(&mut registry);
        registry.announce(connection, "alice".into());

        assert!(registry.remove_user("alice"));
        assert!(!registry.remove_user("alice"));
        assert!(!registry.is_online("alice"));
    }

    #[test]
    fn sessions_for_user_matches_announced_sessions_only() {
        let mut registry = PresenceRegistry::default();
        let alice = registered(&mut registry);
        let bob = registered(&mut registry);
        let silent = registered(&mut registry);
        registry.announce(alice, "alice".into());
        registry.announce(bob, "bob".into());

        assert_eq!(registry.sessions_for_user("alice").count(), 1);
        assert_eq!(registry.sessions_for_user("carol").count(), 0);
        assert!(registry.session(silent).is_some());
        assert_eq!(registry.sessions().count(), 3);
    }

    #[test]
    fn online_users_snapshot_is_sorted() {
        let mut registry = PresenceRegistry::default();
        for name in ["carol", "alice", "bob"] {
            let connection = registered(&mut registry);
            registry.announce(connection, name.into());
        }
        assert_eq!(registry.online_users(), vec!["alice", "bob", "carol"]);
    }
}
