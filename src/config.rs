//! Runtime configuration parsed from environment variables.
//!
//! Every knob has a default so the server boots with no environment at all.
//! Parsing goes through a lookup closure so tests can feed a map instead of
//! mutating the process environment.

use crate::credits::Credits;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

pub const DEFAULT_CREDITS_PER_5_MINUTES: Credits = Credits::whole(1);
pub const DEFAULT_BANK_CUT_PERCENTAGE: u32 = 10;
pub const DEFAULT_INITIAL_USER_CREDITS: Credits = Credits::whole(15);
pub const DEFAULT_INITIAL_BANK_CREDITS: Credits = Credits::whole(100);
pub const DEFAULT_MIN_LEARNER_CREDITS: Credits = Credits::whole(1);
pub const DEFAULT_SUPPORT_COOLDOWN_HOURS: i64 = 24;

const DEFAULT_JOURNAL_QUEUE_CAPACITY: usize = 8192;
const DEFAULT_JOURNAL_BATCH_SIZE: usize = 64;
const DEFAULT_JOURNAL_FLUSH_MS: u64 = 5;
const DEFAULT_JOURNAL_RETRIES: usize = 3;
const DEFAULT_JOURNAL_RETRY_BASE_MS: u64 = 20;

const MS_PER_HOUR: i64 = 60 * 60 * 1000;

// =============================================================================
// ECONOMY
// =============================================================================

/// Rates and thresholds for the credit economy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EconomyConfig {
    /// Credits earned per full five minutes of teaching.
    pub credits_per_5_minutes: Credits,
    /// Share of gross teaching credit diverted to the bank, 0..=100.
    pub bank_cut_percent: u32,
    /// Signup grant for new users.
    pub initial_user_credits: Credits,
    /// Bank balance when no persisted bank exists.
    pub initial_bank_credits: Credits,
    /// Learner balance required before a teaching timer may start.
    pub min_learner_credits: Credits,
    /// Minimum time between two support grants for one user.
    pub support_cooldown_ms: i64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            credits_per_5_minutes: DEFAULT_CREDITS_PER_5_MINUTES,
            bank_cut_percent: DEFAULT_BANK_CUT_PERCENTAGE,
            initial_user_credits: DEFAULT_INITIAL_USER_CREDITS,
            initial_bank_credits: DEFAULT_INITIAL_BANK_CREDITS,
            min_learner_credits: DEFAULT_MIN_LEARNER_CREDITS,
            support_cooldown_ms: DEFAULT_SUPPORT_COOLDOWN_HOURS * MS_PER_HOUR,
        }
    }
}

impl EconomyConfig {
    /// Optional:
    /// - `CREDITS_PER_5_MINUTES`: default 1
    /// - `BANK_CUT_PERCENTAGE`: default 10, clamped to 100
    /// - `INITIAL_USER_CREDITS`: default 15
    /// - `INITIAL_BANK_CREDITS`: default 100
    /// - `MIN_LEARNER_CREDITS`: default 1
    /// - `SUPPORT_CREDIT_COOLDOWN_HOURS`: default 24
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let cooldown_hours = parse_or(&lookup, "SUPPORT_CREDIT_COOLDOWN_HOURS", DEFAULT_SUPPORT_COOLDOWN_HOURS).max(0);
        Self {
            credits_per_5_minutes: credits_or(&lookup, "CREDITS_PER_5_MINUTES", DEFAULT_CREDITS_PER_5_MINUTES),
            bank_cut_percent: parse_or(&lookup, "BANK_CUT_PERCENTAGE", DEFAULT_BANK_CUT_PERCENTAGE).min(100),
            initial_user_credits: credits_or(&lookup, "INITIAL_USER_CREDITS", DEFAULT_INITIAL_USER_CREDITS),
            initial_bank_credits: credits_or(&lookup, "INITIAL_BANK_CREDITS", DEFAULT_INITIAL_BANK_CREDITS),
            min_learner_credits: credits_or(&lookup, "MIN_LEARNER_CREDITS", DEFAULT_MIN_LEARNER_CREDITS),
            support_cooldown_ms: cooldown_hours.saturating_mul(MS_PER_HOUR),
        }
    }
}

// =============================================================================
// JOURNAL
// =============================================================================

/// Tuning knobs for the journal writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalConfig {
    /// Bounded channel capacity, in commits.
    pub queue_capacity: usize,
    /// Maximum commits written per Postgres transaction.
    pub batch_size: usize,
    /// How long to wait for the batch to fill before flushing, in milliseconds.
    pub flush_ms: u64,
    /// Number of attempts per batch on database failures.
    pub retries: usize,
    /// Base delay in milliseconds for linear retry back-off.
    pub retry_base_ms: u64,
}

impl JournalConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            queue_capacity: parse_or(&lookup, "JOURNAL_QUEUE_CAPACITY", DEFAULT_JOURNAL_QUEUE_CAPACITY).max(1),
            batch_size: parse_or(&lookup, "JOURNAL_BATCH_SIZE", DEFAULT_JOURNAL_BATCH_SIZE).max(1),
            flush_ms: parse_or(&lookup, "JOURNAL_FLUSH_MS", DEFAULT_JOURNAL_FLUSH_MS).max(1),
            retries: parse_or(&lookup, "JOURNAL_RETRIES", DEFAULT_JOURNAL_RETRIES).max(1),
            retry_base_ms: parse_or(&lookup, "JOURNAL_RETRY_BASE_MS", DEFAULT_JOURNAL_RETRY_BASE_MS),
        }
    }
}

// =============================================================================
// SERVER
// =============================================================================

/// Process-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Postgres URL. `None` runs the server purely in memory.
    pub database_url: Option<String>,
    pub port: u16,
    pub db_max_connections: u32,
    /// Per-connection outbound queue size.
    pub outbox_capacity: usize,
}

impl ServerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            outbox_capacity: parse_or(&lookup, "OUTBOX_CAPACITY", DEFAULT_OUTBOX_CAPACITY).max(1),
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn credits_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Credits) -> Credits {
    lookup(key)
        .and_then(|v| Credits::parse(&v))
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
