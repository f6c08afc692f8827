//! Live-stream registry.
//!
//! One record per broadcasting user: `absent → live → absent`. Starting a
//! second broadcast for the same user replaces the registry entry wholesale.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::events::ActiveStream;

use super::ConnectionId;

/// Descriptor of one active broadcast and its viewers.
#[derive(Debug, Clone)]
pub(crate) struct StreamRecord {
    pub owner: String,
    pub connection: ConnectionId,
    pub stream_id: String,
    pub viewers: HashSet<String>,
}

/// Registry of live broadcasts keyed by owning user identity.
#[derive(Default)]
pub(crate) struct StreamRegistry {
    live: HashMap<String, StreamRecord>,
    // breaks stream-id ties when two broadcasts start within one millisecond
    sequence: u64,
}

impl StreamRegistry {
    /// Transition `absent → live`, replacing any prior record for the owner.
    /// Returns the generated stream identifier.
    pub(crate) fn start(&mut self, owner: String, connection: ConnectionId) -> String {
        self.sequence = self.sequence.wrapping_add(1);
        let stream_id = format!(
            "{owner}-{}-{}",
            Utc::now().timestamp_millis(),
            self.sequence
        );
        self.live.insert(
            owner.clone(),
            StreamRecord {
                owner,
                connection,
                stream_id: stream_id.clone(),
                viewers: HashSet::new(),
            },
        );
        stream_id
    }

    /// Transition `live → absent`. `None` when the owner is not live.
    pub(crate) fn stop(&mut self, owner: &str) -> Option<StreamRecord> {
        self.live.remove(owner)
    }

    /// Add a viewer to a live record (idempotent). Returns the streamer's
    /// connection and the viewer count, or `None` when the streamer is not
    /// live.
    pub(crate) fn join(&mut self, viewer: &str, streamer: &str) -> Option<(ConnectionId, usize)> {
        let record = self.live.get_mut(streamer)?;
        record.viewers.insert(viewer.to_string());
        Some((record.connection, record.viewers.len()))
    }

    /// Remove a viewer from a live record. `None` when the streamer is not
    /// live or the viewer was not in the set.
    pub(crate) fn leave(&mut self, viewer: &str, streamer: &str) -> Option<(ConnectionId, usize)> {
        let record = self.live.get_mut(streamer)?;
        if !record.viewers.remove(viewer) {
            return None;
        }
        Some((record.connection, record.viewers.len()))
    }

    /// Viewer count for a streamer; 0 when not live.
    pub(crate) fn viewer_count(&self, streamer: &str) -> usize {
        self.live
            .get(streamer)
            .map(|record| record.viewers.len())
            .unwrap_or(0)
    }

    /// Snapshot of every live broadcast, sorted by owner for stable replies.
    pub(crate) fn snapshot(&self) -> Vec<ActiveStream> {
        let mut streams: Vec<ActiveStream> = self
            .live
            .values()
            .map(|record| ActiveStream {
                user_id: record.owner.clone(),
                stream_id: record.stream_id.clone(),
            })
            .collect();
        streams.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        streams
    }

    /// Remove and return every record broadcast from the given connection
    /// (implicit stop on disconnect).
    pub(crate) fn stop_owned_by(&mut self, connection: ConnectionId) -> Vec<StreamRecord> {
        let owners: Vec<String> = self
            .live
            .values()
            .filter(|record| record.connection == connection)
            .map(|record| record.owner.clone())
            .collect();
        owners
            .into_iter()
            .filter_map(|owner| self.live.remove(&owner))
            .collect()
    }

    /// Owners of every live record the given user is currently viewing.
    pub(crate) fn owners_viewed_by(&self, viewer: &str) -> Vec<String> {
        self.live
            .values()
            .filter(|record| record.viewers.contains(viewer))
            .map(|record| record.owner.clone())
            .collect()
    }
}
