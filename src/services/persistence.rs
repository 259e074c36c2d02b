//! Persistence service: the write-behind journal and startup hydration.
//!
//! DESIGN
//! ======
//! In-memory state is authoritative while the process runs. Every committed
//! mutation submits one `Commit` (an ordered group of records) to a bounded
//! queue. A background worker drains the queue in batches and writes each
//! batch inside a single Postgres transaction, so the rows of one commit
//! (for example the five writes of a settlement) land together or not at all.
//!
//! `submit` awaits queue capacity instead of dropping: ledger rows are not
//! best-effort. Callers submit while still holding their locks, so commits
//! for one user or session reach the queue in mutation order.
//!
//! ERROR HANDLING
//! ==============
//! Failed batches are retried with linear back-off. A batch that still fails
//! is logged and dropped; the in-memory state remains correct and the next
//! user/bank upsert carries the latest balance.

use std::time::Duration;

use sqlx::{PgConnection, PgPool};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::JournalConfig;
use crate::credits::Credits;
use crate::services::ledger::{EntryKind, LedgerEntry};
use crate::services::timer::Timer;
use crate::state::{ChatMessage, Session, User};

// =============================================================================
// TYPES
// =============================================================================

/// One row-level change.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(User),
    Entry(LedgerEntry),
    Bank(Credits),
    Session(Session),
    Timer(Timer),
    Chat(ChatMessage),
}

/// Records that must be persisted atomically, in order.
pub type Commit = Vec<Record>;

/// Handle for submitting commits. `disabled` journals discard everything.
#[derive(Clone, Default)]
pub struct Journal {
    tx: Option<mpsc::Sender<Commit>>,
}

impl Journal {
    #[must_use]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// A journal backed by a plain channel. The worker owns the receiver.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Commit>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    pub async fn submit(&self, commit: Commit) {
        let Some(tx) = &self.tx else {
            return;
        };
        if commit.is_empty() {
            return;
        }
        let records = commit.len();
        if tx.send(commit).await.is_err() {
            error!(records, "journal writer stopped; commit not persisted");
        }
    }
}

/// Everything loaded from Postgres at startup.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub entries: Vec<LedgerEntry>,
    pub bank: Option<Credits>,
    pub sessions: Vec<Session>,
    pub timers: Vec<Timer>,
    pub chat: Vec<ChatMessage>,
}

// =============================================================================
// WORKER
// =============================================================================

/// Spawn the journal writer and return its submit handle.
#[must_use]
pub fn spawn_journal_worker(pool: PgPool, config: JournalConfig) -> (Journal, JoinHandle<()>) {
    let (journal, mut rx) = Journal::channel(config.queue_capacity);

    info!(
        queue_capacity = config.queue_capacity,
        batch_size = config.batch_size,
        flush_ms = config.flush_ms,
        retries = config.retries,
        retry_base_ms = config.retry_base_ms,
        "journal worker configured"
    );

    let handle = tokio::spawn(async move {
        let mut batch: Vec<Commit> = Vec::with_capacity(config.batch_size);
        let mut ticker = tokio::time::interval(Duration::from_millis(config.flush_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_commit = rx.recv() => {
                    if let Some(commit) = maybe_commit {
                        batch.push(commit);
                        if batch.len() >= config.batch_size {
                            flush_with_retry(&pool, &mut batch, config).await;
                        }
                    } else {
                        flush_with_retry(&pool, &mut batch, config).await;
                        break;
                    }
                }
                _ = ticker.tick() => {
                    flush_with_retry(&pool, &mut batch, config).await;
                }
            }
        }
    });

    (journal, handle)
}

async fn flush_with_retry(pool: &PgPool, batch: &mut Vec<Commit>, config: JournalConfig) {
    if batch.is_empty() {
        return;
    }

    let drained = std::mem::take(batch);
    for attempt in 1..=config.retries {
        match persist_batch(pool, &drained).await {
            Ok(()) => return,
            Err(e) if attempt < config.retries => {
                warn!(
                    error = %e,
                    attempt,
                    total = config.retries,
                    commits = drained.len(),
                    "journal batch failed; retrying"
                );
                tokio::time::sleep(Duration::from_millis((attempt as u64) * config.retry_base_ms)).await;
            }
            Err(e) => {
                error!(error = %e, commits = drained.len(), "journal batch failed after retries; dropping");
                return;
            }
        }
    }
}

/// Write a batch of commits in one transaction.
///
/// # Errors
///
/// Returns the first database error; the transaction is rolled back.
pub async fn persist_batch(pool: &PgPool, commits: &[Commit]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for record in commits.iter().flatten() {
        write_record(&mut tx, record).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn write_record(conn: &mut PgConnection, record: &Record) -> Result<(), sqlx::Error> {
    match record {
        Record::User(user) => {
            sqlx::query(
                "INSERT INTO users (id, name, credits, is_online, last_seen, last_support_request, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (id) DO UPDATE SET \
                     name = EXCLUDED.name, credits = EXCLUDED.credits, is_online = EXCLUDED.is_online, \
                     last_seen = EXCLUDED.last_seen, last_support_request = EXCLUDED.last_support_request",
            )
            .bind(user.id)
            .bind(&user.name)
            .bind(user.balance.hundredths())
            .bind(user.is_online)
            .bind(user.last_seen)
            .bind(user.last_support_at)
            .bind(user.created_at)
            .execute(conn)
            .await?;
        }
        Record::Entry(entry) => {
            sqlx::query(
                "INSERT INTO credit_transactions \
                     (id, user_id, session_id, amount, transaction_type, balance_after, description, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(entry.id)
            .bind(entry.user_id)
            .bind(entry.session_id)
            .bind(entry.amount.hundredths())
            .bind(entry.kind.as_str())
            .bind(entry.balance_after.hundredths())
            .bind(&entry.description)
            .bind(entry.created_at)
            .execute(conn)
            .await?;
        }
        Record::Bank(total) => {
            sqlx::query(
                "INSERT INTO bank (id, total_credits) VALUES (1, $1) \
                 ON CONFLICT (id) DO UPDATE SET total_credits = EXCLUDED.total_credits",
            )
            .bind(total.hundredths())
            .execute(conn)
            .await?;
        }
        Record::Session(session) => {
            sqlx::query(
                "INSERT INTO sessions \
                     (id, user1_id, user2_id, is_active, start_time, end_time, \
                      whiteboard_state, ide_code, ide_language) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (id) DO UPDATE SET \
                     is_active = EXCLUDED.is_active, end_time = EXCLUDED.end_time, \
                     whiteboard_state = EXCLUDED.whiteboard_state, ide_code = EXCLUDED.ide_code, \
                     ide_language = EXCLUDED.ide_language",
            )
            .bind(session.id)
            .bind(session.user_a)
            .bind(session.user_b)
            .bind(session.is_active)
            .bind(session.started_at)
            .bind(session.ended_at)
            .bind(&session.whiteboard_state)
            .bind(&session.ide_code)
            .bind(&session.ide_language)
            .execute(conn)
            .await?;
        }
        Record::Timer(timer) => {
            sqlx::query(
                "INSERT INTO session_timers (id, session_id, teacher_id, start_time, end_time, duration_seconds) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (id) DO UPDATE SET \
                     end_time = EXCLUDED.end_time, duration_seconds = EXCLUDED.duration_seconds",
            )
            .bind(timer.id)
            .bind(timer.session_id)
            .bind(timer.teacher_id)
            .bind(timer.started_at)
            .bind(timer.ended_at)
            .bind(timer.duration_seconds)
            .execute(conn)
            .await?;
        }
        Record::Chat(message) => {
            sqlx::query(
                "INSERT INTO chat_messages (id, session_id, sender_id, content, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(message.id)
            .bind(message.session_id)
            .bind(message.sender_id)
            .bind(&message.content)
            .bind(message.created_at)
            .execute(conn)
            .await?;
        }
    }
    Ok(())
}

// =============================================================================
// HYDRATION
// =============================================================================

type SessionRow = (uuid::Uuid, uuid::Uuid, uuid::Uuid, bool, i64, Option<i64>, String, String, String);

/// Load all persisted state.
///
/// # Errors
///
/// Returns a database error if any query fails.
pub async fn load_snapshot(pool: &PgPool) -> Result<Snapshot, sqlx::Error> {
    let users = sqlx::query_as::<_, (uuid::Uuid, String, i64, bool, Option<i64>, Option<i64>, i64)>(
        "SELECT id, name, credits, is_online, last_seen, last_support_request, created_at FROM users",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(id, name, credits, is_online, last_seen, last_support_at, created_at)| User {
        id,
        name,
        balance: Credits::from_hundredths(credits),
        is_online,
        last_seen,
        last_support_at,
        created_at,
    })
    .collect();

    let mut entries = Vec::new();
    let rows = sqlx::query_as::<_, (uuid::Uuid, uuid::Uuid, Option<uuid::Uuid>, i64, String, i64, String, i64)>(
        "SELECT id, user_id, session_id, amount, transaction_type, balance_after, description, created_at \
         FROM credit_transactions ORDER BY seq ASC",
    )
    .fetch_all(pool)
    .await?;
    for (id, user_id, session_id, amount, kind, balance_after, description, created_at) in rows {
        let Some(kind) = EntryKind::parse(&kind) else {
            warn!(%id, %kind, "skipping ledger entry with unknown kind");
            continue;
        };
        entries.push(LedgerEntry {
            id,
            user_id,
            amount: Credits::from_hundredths(amount),
            kind,
            balance_after: Credits::from_hundredths(balance_after),
            session_id,
            description,
            created_at,
        });
    }

    let bank = sqlx::query_scalar::<_, i64>("SELECT total_credits FROM bank WHERE id = 1")
        .fetch_optional(pool)
        .await?
        .map(Credits::from_hundredths);

    let sessions = sqlx::query_as::<_, SessionRow>(
        "SELECT id, user1_id, user2_id, is_active, start_time, end_time, whiteboard_state, ide_code, ide_language \
         FROM sessions",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(
        |(id, user_a, user_b, is_active, started_at, ended_at, whiteboard_state, ide_code, ide_language)| Session {
            id,
            user_a,
            user_b,
            is_active,
            started_at,
            ended_at,
            whiteboard_state,
            ide_code,
            ide_language,
        },
    )
    .collect();

    let timers = sqlx::query_as::<_, (uuid::Uuid, uuid::Uuid, uuid::Uuid, i64, Option<i64>, i64)>(
        "SELECT id, session_id, teacher_id, start_time, end_time, duration_seconds FROM session_timers",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(id, session_id, teacher_id, started_at, ended_at, duration_seconds)| Timer {
        id,
        session_id,
        teacher_id,
        started_at,
        ended_at,
        duration_seconds,
    })
    .collect();

    let chat = sqlx::query_as::<_, (uuid::Uuid, uuid::Uuid, uuid::Uuid, String, i64)>(
        "SELECT id, session_id, sender_id, content, created_at FROM chat_messages ORDER BY seq ASC",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(id, session_id, sender_id, content, created_at)| ChatMessage {
        id,
        session_id,
        sender_id,
        content,
        created_at,
    })
    .collect();

    Ok(Snapshot { users, entries, bank, sessions, timers, chat })
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
