//! Session service: the lifecycle of a paired session from creation to
//! settlement.
//!
//! DESIGN
//! ======
//! Every operation clones the session cell out of the registry and locks it,
//! so the registry shard is never held across an await. Precondition checks
//! and the mutation happen under the same session lock.
//!
//! `end_session` is a compare-and-transition: the active flag is checked and
//! flipped under the session lock, and the settlement is applied before the
//! lock is released. A second end, concurrent or later, sees the flag already
//! cleared and fails with `InvalidState` without touching the ledger.
//!
//! LOCK ORDER
//! ==========
//! session → accounts (ascending user id) → bank.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EconomyError;
use crate::event::Outbound;
use crate::services::ledger::LedgerEntry;
use crate::services::persistence::{Commit, Record};
use crate::services::settlement::{Rates, Settlement, settle};
use crate::services::timer::Timer;
use crate::state::{AppState, ChatMessage, Session, SessionCell, SessionState, pair_key};

// =============================================================================
// TYPES
// =============================================================================

/// Session row plus the caller's view of the timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub partner_id: Uuid,
    pub running_timer: Option<Timer>,
    pub my_teaching_seconds: i64,
    pub partner_teaching_seconds: i64,
}

/// Fields a participant may overwrite with `save_state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SaveState {
    pub whiteboard: Option<String>,
    pub ide_code: Option<String>,
    pub ide_language: Option<String>,
}

/// Result of ending a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEnd {
    pub session: Session,
    pub settlement: Settlement,
    pub entries: Vec<LedgerEntry>,
    pub redirect_url: String,
}

#[must_use]
pub fn review_url(session_id: Uuid) -> String {
    format!("/session/{session_id}/review/")
}

fn lookup(state: &AppState, session_id: Uuid) -> Result<SessionCell, EconomyError> {
    state
        .session(session_id)
        .ok_or(EconomyError::SessionNotFound(session_id))
}

fn require_participant(session: &Session, user_id: Uuid) -> Result<Uuid, EconomyError> {
    session
        .partner_of(user_id)
        .ok_or(EconomyError::Unauthorized { user_id, session_id: session.id })
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Pair two users. An active session for the same pair is reused; the
/// returned flag is `true` when a new session was created.
///
/// # Errors
///
/// `MalformedInput` when pairing a user with themselves, `UserNotFound` for
/// unknown users.
pub async fn create_session(
    state: &AppState,
    user_id: Uuid,
    partner_id: Uuid,
    now: i64,
) -> Result<(Session, bool), EconomyError> {
    if user_id == partner_id {
        return Err(EconomyError::MalformedInput("cannot start a session with yourself".into()));
    }
    for id in [user_id, partner_id] {
        if state.ledger.user(id).await.is_none() {
            return Err(EconomyError::UserNotFound(id));
        }
    }

    let session = Session::new(user_id, partner_id, now);
    let session_id = session.id;
    let new_cell: SessionCell = Arc::new(Mutex::new(SessionState::new(session.clone())));
    // Held until the row is journaled so no timer commit can precede it.
    let guard = Arc::clone(&new_cell).lock_owned().await;

    let existing = match state.active_pairs.entry(pair_key(user_id, partner_id)) {
        Entry::Occupied(slot) => Some(*slot.get()),
        Entry::Vacant(slot) => {
            state.sessions.insert(session_id, new_cell);
            slot.insert(session_id);
            None
        }
    };

    if let Some(existing_id) = existing {
        drop(guard);
        let cell = lookup(state, existing_id)?;
        let existing = cell.lock().await;
        debug!(session_id = %existing_id, %user_id, %partner_id, "session: reusing active session");
        return Ok((existing.session.clone(), false));
    }

    state.journal.submit(vec![Record::Session(session.clone())]).await;
    drop(guard);

    info!(%session_id, %user_id, %partner_id, "session: created");
    Ok((session, true))
}

/// # Errors
///
/// `SessionNotFound` or `Unauthorized` for non-participants.
pub async fn get_session(state: &AppState, session_id: Uuid, user_id: Uuid) -> Result<SessionView, EconomyError> {
    let cell = lookup(state, session_id)?;
    let live = cell.lock().await;
    let partner_id = require_participant(&live.session, user_id)?;
    Ok(SessionView {
        session: live.session.clone(),
        partner_id,
        running_timer: live.timers.running().cloned(),
        my_teaching_seconds: live.timers.teaching_seconds(user_id),
        partner_teaching_seconds: live.timers.teaching_seconds(partner_id),
    })
}

/// Closed teaching seconds for `user_id` in this session.
///
/// # Errors
///
/// `SessionNotFound` or `Unauthorized` for non-participants.
pub async fn teaching_seconds(state: &AppState, session_id: Uuid, user_id: Uuid) -> Result<i64, EconomyError> {
    let cell = lookup(state, session_id)?;
    let live = cell.lock().await;
    require_participant(&live.session, user_id)?;
    Ok(live.timers.teaching_seconds(user_id))
}

/// Chat lines, oldest first.
///
/// # Errors
///
/// `SessionNotFound` or `Unauthorized` for non-participants.
pub async fn chat_history(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<ChatMessage>, EconomyError> {
    let cell = lookup(state, session_id)?;
    let live = cell.lock().await;
    require_participant(&live.session, user_id)?;
    Ok(live.chat.clone())
}

// =============================================================================
// TIMERS
// =============================================================================

/// Start teaching as `teacher_id`. Any running timer is closed first.
///
/// # Errors
///
/// `Unauthorized` for non-participants, `InvalidState` once the session has
/// ended, `InsufficientFunds` when the learner holds less than the minimum.
pub async fn start_timer(
    state: &AppState,
    session_id: Uuid,
    teacher_id: Uuid,
    now: i64,
) -> Result<Timer, EconomyError> {
    let cell = lookup(state, session_id)?;
    let mut live = cell.lock().await;
    let learner_id = require_participant(&live.session, teacher_id)?;
    if !live.session.is_active {
        return Err(EconomyError::InvalidState("session has ended"));
    }

    let learner_balance = state.ledger.balance(learner_id).await?;
    let minimum = state.economy.min_learner_credits;
    if learner_balance < minimum {
        return Err(EconomyError::InsufficientFunds { needed: minimum, available: learner_balance });
    }

    let (closed, started) = live.timers.start(session_id, teacher_id, now);
    let mut commit = Commit::new();
    if let Some(closed) = closed {
        commit.push(Record::Timer(closed));
    }
    commit.push(Record::Timer(started.clone()));
    state.journal.submit(commit).await;

    info!(%session_id, %teacher_id, timer_id = %started.id, "timer: started");
    Ok(started)
}

/// Stop the running timer.
///
/// # Errors
///
/// `Unauthorized` for non-participants, `InvalidState` when no timer runs.
pub async fn stop_timer(state: &AppState, session_id: Uuid, user_id: Uuid, now: i64) -> Result<Timer, EconomyError> {
    let cell = lookup(state, session_id)?;
    let mut live = cell.lock().await;
    require_participant(&live.session, user_id)?;

    let stopped = live
        .timers
        .stop(now)
        .ok_or(EconomyError::InvalidState("no timer is running"))?;
    state.journal.submit(vec![Record::Timer(stopped.clone())]).await;

    info!(%session_id, teacher_id = %stopped.teacher_id, seconds = stopped.duration_seconds, "timer: stopped");
    Ok(stopped)
}

// =============================================================================
// END
// =============================================================================

/// End the session: force-stop the timer, settle both directions, and
/// announce `session_ended` to the room.
///
/// # Errors
///
/// `Unauthorized` for non-participants, `InvalidState` if already ended.
pub async fn end_session(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    now: i64,
) -> Result<SessionEnd, EconomyError> {
    let cell = lookup(state, session_id)?;
    let mut live = cell.lock().await;
    require_participant(&live.session, user_id)?;
    if !live.session.is_active {
        return Err(EconomyError::InvalidState("session already ended"));
    }

    // Work on copies so a failed settlement leaves the session untouched.
    let mut timers = live.timers.clone();
    let closed = timers.stop(now);
    let mut session = live.session.clone();
    session.is_active = false;
    session.ended_at = Some(now);

    let settlement = settle(
        (session.user_a, timers.teaching_seconds(session.user_a)),
        (session.user_b, timers.teaching_seconds(session.user_b)),
        Rates::from(&state.economy),
    );

    let mut prelude = Commit::new();
    if let Some(closed) = closed {
        prelude.push(Record::Timer(closed));
    }
    prelude.push(Record::Session(session.clone()));
    let entries = state
        .ledger
        .apply_settlement(session_id, &settlement, prelude, now)
        .await?;

    live.timers = timers;
    live.session = session.clone();
    drop(live);

    state
        .active_pairs
        .remove_if(&session.pair_key(), |_, active| *active == session_id);

    let redirect_url = review_url(session_id);
    let delivered = state.rooms.broadcast(
        session_id,
        &Outbound::SessionEnded { redirect_url: redirect_url.clone(), settlement },
        None,
    );

    info!(%session_id, %user_id, delivered, entries = entries.len(), "session: ended");
    Ok(SessionEnd { session, settlement, entries, redirect_url })
}

// =============================================================================
// SHARED STATE
// =============================================================================

/// Overwrite the provided whiteboard/code fields. Allowed after the session
/// has ended so the review page can keep the final state.
///
/// # Errors
///
/// `Unauthorized` for non-participants.
pub async fn save_state(
    state: &AppState,
    session_id: Uuid,
    user_id: Uuid,
    fields: SaveState,
) -> Result<Session, EconomyError> {
    let cell = lookup(state, session_id)?;
    let mut live = cell.lock().await;
    require_participant(&live.session, user_id)?;

    let SaveState { whiteboard, ide_code, ide_language } = fields;
    if let Some(whiteboard) = whiteboard {
        live.session.whiteboard_state = whiteboard;
    }
    if let Some(code) = ide_code {
        live.session.ide_code = code;
    }
    if let Some(language) = ide_language {
        live.session.ide_language = language;
    }
    state.journal.submit(vec![Record::Session(live.session.clone())]).await;

    debug!(%session_id, %user_id, "session: state saved");
    Ok(live.session.clone())
}

/// Append a chat line. `None` when the session no longer exists.
pub async fn persist_chat(
    state: &AppState,
    session_id: Uuid,
    sender_id: Uuid,
    content: &str,
    now: i64,
) -> Option<ChatMessage> {
    let Some(cell) = state.session(session_id) else {
        debug!(%session_id, %sender_id, "chat: session gone; message not persisted");
        return None;
    };
    let mut live = cell.lock().await;
    let message = ChatMessage {
        id: Uuid::new_v4(),
        session_id,
        sender_id,
        content: content.to_owned(),
        created_at: now,
    };
    live.chat.push(message.clone());
    state.journal.submit(vec![Record::Chat(message.clone())]).await;
    Some(message)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
