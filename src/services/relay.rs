//! Event relay: dispatches inbound events and fans them out to the room.
//!
//! ARCHITECTURE
//! ============
//! The websocket route parses each text frame and hands it here together
//! with the sender's connection identity. The relay performs the event's
//! side effect (only chat persists anything) and broadcasts the outbound
//! form, honoring [`Outbound::echo`] for who receives it.

use tracing::debug;
use uuid::Uuid;

use crate::event::{Echo, Inbound, Outbound};
use crate::services::session;
use crate::state::{AppState, now_ms};

/// Identity of the connection an event arrived on.
#[derive(Debug, Clone)]
pub struct Connection {
    pub session_id: Uuid,
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
}

/// Parse and dispatch one text frame. Malformed frames are dropped.
pub async fn handle_text(state: &AppState, conn: &Connection, text: &str) -> usize {
    match Inbound::parse(text) {
        Ok(event) => handle(state, conn, event).await,
        Err(e) => {
            debug!(
                session_id = %conn.session_id,
                connection_id = %conn.connection_id,
                error = %e,
                "relay: dropped malformed event"
            );
            0
        }
    }
}

/// Dispatch one event. Returns the number of outboxes it reached.
pub async fn handle(state: &AppState, conn: &Connection, event: Inbound) -> usize {
    let outbound = match event {
        Inbound::Chat { content } => {
            if content.is_empty() {
                debug!(session_id = %conn.session_id, "relay: ignored empty chat");
                return 0;
            }
            session::persist_chat(state, conn.session_id, conn.user_id, &content, now_ms()).await;
            Outbound::Chat { sender: conn.user_name.clone(), sender_id: conn.user_id, content }
        }
        Inbound::Timer { action } => {
            Outbound::Timer { action, user_id: conn.user_id, user_name: conn.user_name.clone() }
        }
        Inbound::Whiteboard { data } => Outbound::Whiteboard { data },
        Inbound::CodeChange { code, language } => Outbound::CodeChange { code, language },
        Inbound::VideoSignal { data } => Outbound::VideoSignal { data },
    };

    let exclude = match outbound.echo() {
        Echo::IncludeSender => None,
        Echo::ExcludeSender => Some(conn.connection_id),
    };
    let delivered = state.rooms.broadcast(conn.session_id, &outbound, exclude);
    debug!(session_id = %conn.session_id, kind = outbound.kind(), delivered, "relay: broadcast");
    delivered
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
