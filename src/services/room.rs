//! Room registry: which connections are in which session room.
//!
//! DESIGN
//! ======
//! Rooms are created lazily on first join and discarded when the last
//! connection leaves. Nothing here is persisted. Each member owns a bounded
//! outbox; broadcast is a `try_send` per member, so a slow or gone reader is
//! skipped instead of stalling the sender.
//!
//! Presence is counted per user across all rooms: a user is online while
//! they hold at least one connection anywhere.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::Outbound;

/// One live connection inside a room.
#[derive(Debug, Clone)]
pub struct Member {
    pub user_id: Uuid,
    pub user_name: String,
    outbox: mpsc::Sender<Outbound>,
}

/// Presence change caused by a join or leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    CameOnline,
    WentOffline,
    Unchanged,
}

#[derive(Default)]
pub struct Rooms {
    rooms: DashMap<Uuid, HashMap<Uuid, Member>>,
    connections_per_user: DashMap<Uuid, usize>,
}

impl Rooms {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a session room, creating the room if needed.
    pub fn join(
        &self,
        session_id: Uuid,
        connection_id: Uuid,
        user_id: Uuid,
        user_name: &str,
        outbox: mpsc::Sender<Outbound>,
    ) -> Presence {
        let members = {
            let mut room = self.rooms.entry(session_id).or_default();
            room.insert(connection_id, Member { user_id, user_name: user_name.to_owned(), outbox });
            room.len()
        };

        let presence = {
            let mut count = self.connections_per_user.entry(user_id).or_insert(0);
            *count += 1;
            if *count == 1 { Presence::CameOnline } else { Presence::Unchanged }
        };

        info!(%session_id, %connection_id, %user_id, members, "room: joined");
        presence
    }

    /// Remove a connection. Returns the member's user id and the presence
    /// change, or `None` if the connection was not in the room.
    pub fn leave(&self, session_id: Uuid, connection_id: Uuid) -> Option<(Uuid, Presence)> {
        let (member, remaining) = {
            let mut room = self.rooms.get_mut(&session_id)?;
            let member = room.remove(&connection_id)?;
            (member, room.len())
        };
        if remaining == 0 {
            self.rooms.remove_if(&session_id, |_, room| room.is_empty());
            debug!(%session_id, "room: discarded empty room");
        }

        let went_offline = match self.connections_per_user.get_mut(&member.user_id) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => true,
        };
        let presence = if went_offline {
            self.connections_per_user
                .remove_if(&member.user_id, |_, count| *count == 0);
            Presence::WentOffline
        } else {
            Presence::Unchanged
        };

        info!(%session_id, %connection_id, user_id = %member.user_id, remaining, "room: left");
        Some((member.user_id, presence))
    }

    /// Whether the user holds at least one live connection in any room.
    #[must_use]
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.connections_per_user.get(&user_id).is_some_and(|count| *count > 0)
    }

    /// Connection ids currently in the room, with their user ids.
    #[must_use]
    pub fn members(&self, session_id: Uuid) -> Vec<(Uuid, Uuid)> {
        self.rooms
            .get(&session_id)
            .map(|room| room.iter().map(|(conn, m)| (*conn, m.user_id)).collect())
            .unwrap_or_default()
    }

    /// Send an event to every member, optionally excluding one connection.
    /// Returns the number of outboxes that accepted the event.
    pub fn broadcast(&self, session_id: Uuid, event: &Outbound, exclude: Option<Uuid>) -> usize {
        let Some(room) = self.rooms.get(&session_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (connection_id, member) in room.iter() {
            if exclude == Some(*connection_id) {
                continue;
            }
            // Best-effort: a full or closed outbox is skipped.
            if member.outbox.try_send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(%session_id, %connection_id, kind = event.kind(), "room: outbox unavailable; event skipped");
            }
        }
        delivered
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
