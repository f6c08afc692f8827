//! Call-setup signaling relay.
//!
//! Pure forwarding: offers, answers, and candidates are delivered to the
//! sessions currently announced as the target identity without interpreting
//! the payload. A target with no live session means the event is dropped:
//! best-effort only, no queuing and no error back to the sender.

use tracing::debug;

use crate::events::ServerEvent;

use super::presence::PresenceRegistry;

/// Forward a signaling event to every session announced as `target`.
pub(crate) fn relay_signal(presence: &PresenceRegistry, target: &str, event: ServerEvent) {
    if !presence.is_online(target) {
        debug!(target, "dropping signaling event for offline target");
        return;
    }
    let mut delivered = 0usize;
    for session in presence.sessions_for_user(target) {
        session.send(event.clone());
        delivered += 1;
    }
    if delivered == 0 {
        debug!(target, "signaling target online but has no live session");
    }
}
