//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the ledger, the live session registry, and the relay rooms.
//! Each session sits behind its own mutex so unrelated sessions never
//! serialize; the registry itself is a sharded map.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::EconomyConfig;
use crate::credits::Credits;
use crate::services::ledger::Ledger;
use crate::services::persistence::{Journal, Snapshot};
use crate::services::room::Rooms;
use crate::services::timer::TimerLog;

pub const DEFAULT_IDE_CODE: &str = "// Start coding...";
pub const DEFAULT_IDE_LANGUAGE: &str = "javascript";

/// Current wall clock in epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

// =============================================================================
// MODELS
// =============================================================================

/// A participant account. Mirrors the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub balance: Credits,
    pub is_online: bool,
    pub last_seen: Option<i64>,
    pub last_support_at: Option<i64>,
    pub created_at: i64,
}

/// A two-person session. Mirrors the `sessions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub is_active: bool,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub whiteboard_state: String,
    pub ide_code: String,
    pub ide_language: String,
}

impl Session {
    #[must_use]
    pub fn new(user_a: Uuid, user_b: Uuid, now: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_a,
            user_b,
            is_active: true,
            started_at: now,
            ended_at: None,
            whiteboard_state: String::new(),
            ide_code: DEFAULT_IDE_CODE.to_owned(),
            ide_language: DEFAULT_IDE_LANGUAGE.to_owned(),
        }
    }

    #[must_use]
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The other participant, or `None` for outsiders.
    #[must_use]
    pub fn partner_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user_a == user_id {
            Some(self.user_b)
        } else if self.user_b == user_id {
            Some(self.user_a)
        } else {
            None
        }
    }

    /// Order-independent key for the participant pair.
    #[must_use]
    pub fn pair_key(&self) -> (Uuid, Uuid) {
        pair_key(self.user_a, self.user_b)
    }
}

#[must_use]
pub fn pair_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

/// A persisted chat line. Mirrors the `chat_messages` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: i64,
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// Live state of one session: the row, its timer log and chat history.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session: Session,
    pub timers: TimerLog,
    pub chat: Vec<ChatMessage>,
}

impl SessionState {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session, timers: TimerLog::default(), chat: Vec::new() }
    }
}

pub type SessionCell = Arc<Mutex<SessionState>>;

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub economy: EconomyConfig,
    pub ledger: Arc<Ledger>,
    /// Live sessions keyed by session id.
    pub sessions: Arc<DashMap<Uuid, SessionCell>>,
    /// Active session per participant pair (see [`pair_key`]).
    pub active_pairs: Arc<DashMap<(Uuid, Uuid), Uuid>>,
    pub rooms: Arc<Rooms>,
    pub journal: Journal,
    /// Per-connection outbox capacity.
    pub outbox_capacity: usize,
}

impl AppState {
    #[must_use]
    pub fn new(economy: EconomyConfig, journal: Journal, outbox_capacity: usize) -> Self {
        Self {
            economy,
            ledger: Arc::new(Ledger::new(economy, journal.clone())),
            sessions: Arc::new(DashMap::new()),
            active_pairs: Arc::new(DashMap::new()),
            rooms: Arc::new(Rooms::new()),
            journal,
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Rebuild live state from a persisted snapshot.
    #[must_use]
    pub fn hydrate(economy: EconomyConfig, journal: Journal, outbox_capacity: usize, snapshot: Snapshot) -> Self {
        let Snapshot { users, entries, bank, sessions, timers, chat } = snapshot;

        let mut timers_by_session: HashMap<Uuid, Vec<_>> = HashMap::new();
        for timer in timers {
            timers_by_session.entry(timer.session_id).or_default().push(timer);
        }
        let mut chat_by_session: HashMap<Uuid, Vec<ChatMessage>> = HashMap::new();
        for message in chat {
            chat_by_session.entry(message.session_id).or_default().push(message);
        }

        let state = Self {
            economy,
            ledger: Arc::new(Ledger::hydrate(economy, journal.clone(), users, entries, bank)),
            sessions: Arc::new(DashMap::new()),
            active_pairs: Arc::new(DashMap::new()),
            rooms: Arc::new(Rooms::new()),
            journal,
            outbox_capacity: outbox_capacity.max(1),
        };

        let mut active: HashMap<(Uuid, Uuid), (i64, Uuid)> = HashMap::new();
        for session in sessions {
            if session.is_active {
                let slot = active.entry(session.pair_key()).or_insert((session.started_at, session.id));
                if session.started_at > slot.0 {
                    *slot = (session.started_at, session.id);
                }
            }
            let timers = TimerLog::from_timers(timers_by_session.remove(&session.id).unwrap_or_default());
            let chat = chat_by_session.remove(&session.id).unwrap_or_default();
            state
                .sessions
                .insert(session.id, Arc::new(Mutex::new(SessionState { session, timers, chat })));
        }
        for (pair, (_, session_id)) in active {
            state.active_pairs.insert(pair, session_id);
        }

        state
    }

    /// Look up a live session without holding the map shard.
    #[must_use]
    pub fn session(&self, session_id: Uuid) -> Option<SessionCell> {
        self.sessions.get(&session_id).map(|cell| Arc::clone(cell.value()))
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::services::persistence::Commit;
    use tokio::sync::mpsc;

    /// App state with the default economy and no persistence.
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(EconomyConfig::default(), Journal::disabled(), 64)
    }

    /// App state whose journal commits are captured on the returned channel.
    #[must_use]
    pub fn test_app_state_with_journal() -> (AppState, mpsc::Receiver<Commit>) {
        let (journal, rx) = Journal::channel(1024);
        (AppState::new(EconomyConfig::default(), journal, 64), rx)
    }

    /// Create a user holding exactly `balance` credits.
    pub async fn seed_user(state: &AppState, name: &str, balance: Credits) -> Uuid {
        state
            .ledger
            .open_account_with(name, balance, now_ms())
            .await
            .id
    }

    /// Create two users with `balance` each and an active session between them.
    pub async fn seed_session(state: &AppState, balance: Credits) -> (Uuid, Uuid, Uuid) {
        let a = seed_user(state, "alice", balance).await;
        let b = seed_user(state, "bob", balance).await;
        let session = Session::new(a, b, now_ms());
        let session_id = session.id;
        state.active_pairs.insert(session.pair_key(), session_id);
        state
            .sessions
            .insert(session_id, Arc::new(Mutex::new(SessionState::new(session))));
        (session_id, a, b)
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
