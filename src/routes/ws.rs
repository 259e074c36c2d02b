//! WebSocket handler: the session relay transport.
//!
//! DESIGN
//! ======
//! On upgrade, the connection joins its session room and enters a `select!`
//! loop:
//! - Incoming client text → parse + dispatch through the relay
//! - Events from the room outbox → serialize + forward to the client
//!
//! The relay decides who receives what; this module only moves frames.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → join room, mark user online
//! 2. Client sends events → relay → room broadcast
//! 3. Close → leave room, stamp last-seen, mark offline if no other connection

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::auth::header_user_id;
use crate::error::EconomyError;
use crate::event::Outbound;
use crate::services::relay::{self, Connection};
use crate::state::{AppState, now_ms};

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Browsers cannot set headers on upgrade requests, so the acting user
    /// may also arrive as a query parameter.
    pub user_id: Option<Uuid>,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(user_id) = header_user_id(&headers).or(params.user_id) else {
        return (StatusCode::UNAUTHORIZED, "user required").into_response();
    };
    let Some(user) = state.ledger.user(user_id).await else {
        return (StatusCode::UNAUTHORIZED, "unknown user").into_response();
    };
    let Some(cell) = state.session(session_id) else {
        return EconomyError::SessionNotFound(session_id).into_response();
    };
    let is_participant = cell.lock().await.session.is_participant(user_id);
    if !is_participant {
        return EconomyError::Unauthorized { user_id, session_id }.into_response();
    }

    let conn = Connection { session_id, connection_id: Uuid::new_v4(), user_id, user_name: user.name };
    ws.on_upgrade(move |socket| run_ws(socket, state, conn))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, conn: Connection) {
    // Per-connection outbox for events broadcast to the room.
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Outbound>(state.outbox_capacity);

    let presence = state
        .rooms
        .join(conn.session_id, conn.connection_id, conn.user_id, &conn.user_name, outbox_tx);
    refresh_presence(&state, conn.user_id).await;

    info!(
        session_id = %conn.session_id,
        connection_id = %conn.connection_id,
        user_id = %conn.user_id,
        ?presence,
        "ws: client connected"
    );

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        relay::handle_text(&state, &conn, text.as_str()).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = outbox_rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some((user_id, presence)) = state.rooms.leave(conn.session_id, conn.connection_id) {
        refresh_presence(&state, user_id).await;
        debug!(%user_id, ?presence, "ws: presence after leave");
    }
    info!(session_id = %conn.session_id, connection_id = %conn.connection_id, "ws: client disconnected");
}

/// Write the user's presence from the live connection count. A reconnect
/// racing a disconnect cannot leave a connected user marked offline.
async fn refresh_presence(state: &AppState, user_id: Uuid) {
    state
        .ledger
        .refresh_presence(user_id, now_ms(), || state.rooms.is_online(user_id))
        .await;
}

async fn send_event(socket: &mut WebSocket, event: &Outbound) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, kind = event.kind(), "ws: failed to serialize event");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
