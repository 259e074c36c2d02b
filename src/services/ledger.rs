//! Ledger service: balances and entry logs per user, plus the bank pool.
//!
//! DESIGN
//! ======
//! Each account sits behind its own mutex inside a sharded map, so writes to
//! different users never contend. The bank is a single pool owned by the
//! ledger and reached only through `Bank::add` / `Bank::deduct`.
//!
//! Multi-party operations lock accounts in ascending user-id order and take
//! the bank lock last. Every precondition is checked while the locks are
//! held and before the first mutation, so a rejected operation writes
//! nothing. The journal commit is submitted before the locks are released,
//! which keeps persisted rows in the same order as in-memory changes.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EconomyConfig;
use crate::credits::Credits;
use crate::error::EconomyError;
use crate::services::persistence::{Commit, Journal, Record};
use crate::services::settlement::Settlement;
use crate::state::User;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Teaching,
    Learning,
    Signup,
    Support,
    BankCut,
    Donation,
}

impl EntryKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teaching => "teaching",
            Self::Learning => "learning",
            Self::Signup => "signup",
            Self::Support => "support",
            Self::BankCut => "bank_cut",
            Self::Donation => "donation",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "teaching" => Some(Self::Teaching),
            "learning" => Some(Self::Learning),
            "signup" => Some(Self::Signup),
            "support" => Some(Self::Support),
            "bank_cut" => Some(Self::BankCut),
            "donation" => Some(Self::Donation),
            _ => None,
        }
    }
}

/// One immutable balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Credits,
    pub kind: EntryKind,
    /// Balance immediately after this entry was applied.
    pub balance_after: Credits,
    pub session_id: Option<Uuid>,
    pub description: String,
    pub created_at: i64,
}

/// A user plus their entry log, oldest first.
#[derive(Debug, Clone)]
pub struct Account {
    pub user: User,
    pub entries: Vec<LedgerEntry>,
}

impl Account {
    fn apply(
        &mut self,
        amount: Credits,
        kind: EntryKind,
        session_id: Option<Uuid>,
        description: String,
        now: i64,
    ) -> LedgerEntry {
        self.user.balance += amount;
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: self.user.id,
            amount,
            kind,
            balance_after: self.user.balance,
            session_id,
            description,
            created_at: now,
        };
        self.entries.push(entry.clone());
        entry
    }
}

/// The shared credit pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bank {
    balance: Credits,
}

impl Bank {
    #[must_use]
    pub fn new(balance: Credits) -> Self {
        Self { balance }
    }

    #[must_use]
    pub fn balance(&self) -> Credits {
        self.balance
    }

    pub fn add(&mut self, amount: Credits) {
        self.balance += amount;
    }

    pub fn deduct(&mut self, amount: Credits) {
        self.balance -= amount;
    }

    /// Support tier for a user balance: 6 at or below zero, 4 up to 2,
    /// 2 up to 3, otherwise 0 (ineligible).
    #[must_use]
    pub fn support_amount(user_balance: Credits) -> Credits {
        if user_balance <= Credits::ZERO {
            Credits::whole(6)
        } else if user_balance <= Credits::whole(2) {
            Credits::whole(4)
        } else if user_balance <= Credits::whole(3) {
            Credits::whole(2)
        } else {
            Credits::ZERO
        }
    }
}

/// What the bank page shows a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankStatus {
    pub bank_balance: Credits,
    pub user_balance: Credits,
    pub support_amount: Credits,
    pub can_request_support: bool,
    pub cooldown_ends_at: Option<i64>,
    pub reason: Option<&'static str>,
}

/// A bank flow result with both balances as they stood when it committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankReceipt {
    pub entry: LedgerEntry,
    pub balance: Credits,
    pub bank_balance: Credits,
}

const REASON_ABOVE_THRESHOLD: &str = "balance above support threshold";
const REASON_COOLDOWN: &str = "support cooldown active";

// =============================================================================
// LEDGER
// =============================================================================

pub struct Ledger {
    accounts: DashMap<Uuid, Arc<Mutex<Account>>>,
    bank: Mutex<Bank>,
    journal: Journal,
    config: EconomyConfig,
}

impl Ledger {
    #[must_use]
    pub fn new(config: EconomyConfig, journal: Journal) -> Self {
        Self {
            accounts: DashMap::new(),
            bank: Mutex::new(Bank::new(config.initial_bank_credits)),
            journal,
            config,
        }
    }

    /// Rebuild from persisted users, entries and bank balance.
    #[must_use]
    pub fn hydrate(
        config: EconomyConfig,
        journal: Journal,
        users: Vec<User>,
        entries: Vec<LedgerEntry>,
        bank: Option<Credits>,
    ) -> Self {
        let mut by_user: HashMap<Uuid, Vec<LedgerEntry>> = HashMap::new();
        for entry in entries {
            by_user.entry(entry.user_id).or_default().push(entry);
        }

        let ledger = Self {
            accounts: DashMap::new(),
            bank: Mutex::new(Bank::new(bank.unwrap_or(config.initial_bank_credits))),
            journal,
            config,
        };
        for user in users {
            let mut entries = by_user.remove(&user.id).unwrap_or_default();
            entries.sort_by_key(|e| e.created_at);
            ledger
                .accounts
                .insert(user.id, Arc::new(Mutex::new(Account { user, entries })));
        }
        ledger
    }

    fn account(&self, user_id: Uuid) -> Result<Arc<Mutex<Account>>, EconomyError> {
        self.accounts
            .get(&user_id)
            .map(|a| Arc::clone(a.value()))
            .ok_or(EconomyError::UserNotFound(user_id))
    }

    // -------------------------------------------------------------------------
    // ACCOUNTS
    // -------------------------------------------------------------------------

    /// Create a user with the configured signup grant.
    pub async fn open_account(&self, name: &str, now: i64) -> User {
        self.open_account_with(name, self.config.initial_user_credits, now)
            .await
    }

    /// Create a user whose balance starts at zero and is raised to
    /// `initial` by a `signup` entry.
    pub async fn open_account_with(&self, name: &str, initial: Credits, now: i64) -> User {
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            balance: Credits::ZERO,
            is_online: false,
            last_seen: None,
            last_support_at: None,
            created_at: now,
        };
        let cell = Arc::new(Mutex::new(Account { user, entries: Vec::new() }));
        let mut account = Arc::clone(&cell).lock_owned().await;
        self.accounts.insert(account.user.id, cell);

        let mut commit = Commit::new();
        if initial != Credits::ZERO {
            let entry = account.apply(initial, EntryKind::Signup, None, "Welcome bonus credits".into(), now);
            commit.push(Record::Entry(entry));
        }
        commit.insert(0, Record::User(account.user.clone()));
        self.journal.submit(commit).await;

        info!(user_id = %account.user.id, balance = %account.user.balance, "ledger: account opened");
        account.user.clone()
    }

    pub async fn user(&self, user_id: Uuid) -> Option<User> {
        let cell = self.account(user_id).ok()?;
        let account = cell.lock().await;
        Some(account.user.clone())
    }

    /// # Errors
    ///
    /// Returns `UserNotFound` for unknown users.
    pub async fn balance(&self, user_id: Uuid) -> Result<Credits, EconomyError> {
        let cell = self.account(user_id)?;
        let account = cell.lock().await;
        Ok(account.user.balance)
    }

    /// Entry history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` for unknown users.
    pub async fn entries(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, EconomyError> {
        let cell = self.account(user_id)?;
        let account = cell.lock().await;
        Ok(account.entries.iter().rev().cloned().collect())
    }

    pub async fn bank_balance(&self) -> Credits {
        self.bank.lock().await.balance()
    }

    /// Stamp presence on a user. Unknown users are ignored.
    ///
    /// `is_online` is evaluated under the account lock, so the last refresh
    /// always writes the connection state current at that moment.
    pub async fn refresh_presence(&self, user_id: Uuid, now: i64, is_online: impl FnOnce() -> bool) {
        let Ok(cell) = self.account(user_id) else {
            return;
        };
        let mut account = cell.lock().await;
        account.user.is_online = is_online();
        account.user.last_seen = Some(now);
        self.journal
            .submit(vec![Record::User(account.user.clone())])
            .await;
    }

    // -------------------------------------------------------------------------
    // RECORD
    // -------------------------------------------------------------------------

    /// Apply one signed change to a user's balance and append the entry.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` for unknown users.
    pub async fn record(
        &self,
        user_id: Uuid,
        amount: Credits,
        kind: EntryKind,
        session_id: Option<Uuid>,
        description: Option<&str>,
        now: i64,
    ) -> Result<LedgerEntry, EconomyError> {
        let cell = self.account(user_id)?;
        let mut account = cell.lock().await;
        let entry = account.apply(amount, kind, session_id, description.unwrap_or_default().to_owned(), now);
        self.journal
            .submit(vec![Record::User(account.user.clone()), Record::Entry(entry.clone())])
            .await;
        Ok(entry)
    }

    // -------------------------------------------------------------------------
    // BANK FLOWS
    // -------------------------------------------------------------------------

    /// Move `amount` from the donor to the bank.
    ///
    /// # Errors
    ///
    /// `MalformedInput` for non-positive amounts, `InsufficientFunds` when
    /// the donor holds less than `amount`.
    pub async fn donate(&self, user_id: Uuid, amount: Credits, now: i64) -> Result<BankReceipt, EconomyError> {
        if !amount.is_positive() {
            return Err(EconomyError::MalformedInput("donation amount must be positive".into()));
        }
        let cell = self.account(user_id)?;
        let mut account = cell.lock().await;
        if amount > account.user.balance {
            return Err(EconomyError::InsufficientFunds { needed: amount, available: account.user.balance });
        }

        let mut bank = self.bank.lock().await;
        let entry = account.apply(-amount, EntryKind::Donation, None, "Donation to Bank".into(), now);
        bank.add(amount);
        self.journal
            .submit(vec![
                Record::User(account.user.clone()),
                Record::Entry(entry.clone()),
                Record::Bank(bank.balance()),
            ])
            .await;

        info!(%user_id, %amount, bank = %bank.balance(), "ledger: donation");
        Ok(BankReceipt { balance: entry.balance_after, bank_balance: bank.balance(), entry })
    }

    /// Grant the user's support tier from the bank.
    ///
    /// # Errors
    ///
    /// `NotEligible` above the threshold or inside the cooldown window,
    /// `InsufficientFunds` when the bank cannot cover the grant.
    pub async fn request_support(&self, user_id: Uuid, now: i64) -> Result<BankReceipt, EconomyError> {
        let cell = self.account(user_id)?;
        let mut account = cell.lock().await;

        let amount = Bank::support_amount(account.user.balance);
        if amount == Credits::ZERO {
            return Err(EconomyError::NotEligible(REASON_ABOVE_THRESHOLD));
        }
        if self.cooldown_end(&account.user, now).is_some() {
            return Err(EconomyError::NotEligible(REASON_COOLDOWN));
        }

        let mut bank = self.bank.lock().await;
        if bank.balance() < amount {
            return Err(EconomyError::InsufficientFunds { needed: amount, available: bank.balance() });
        }

        bank.deduct(amount);
        let entry = account.apply(amount, EntryKind::Support, None, format!("Bank support ({amount} credits)"), now);
        account.user.last_support_at = Some(now);
        self.journal
            .submit(vec![
                Record::User(account.user.clone()),
                Record::Entry(entry.clone()),
                Record::Bank(bank.balance()),
            ])
            .await;

        info!(%user_id, %amount, bank = %bank.balance(), "ledger: support granted");
        Ok(BankReceipt { balance: entry.balance_after, bank_balance: bank.balance(), entry })
    }

    /// # Errors
    ///
    /// Returns `UserNotFound` for unknown users.
    pub async fn bank_status(&self, user_id: Uuid, now: i64) -> Result<BankStatus, EconomyError> {
        let cell = self.account(user_id)?;
        let account = cell.lock().await;
        let bank_balance = self.bank.lock().await.balance();

        let support_amount = Bank::support_amount(account.user.balance);
        let cooldown_ends_at = self.cooldown_end(&account.user, now);
        let reason = if support_amount == Credits::ZERO {
            Some(REASON_ABOVE_THRESHOLD)
        } else if cooldown_ends_at.is_some() {
            Some(REASON_COOLDOWN)
        } else {
            None
        };

        Ok(BankStatus {
            bank_balance,
            user_balance: account.user.balance,
            support_amount,
            can_request_support: reason.is_none(),
            cooldown_ends_at,
            reason,
        })
    }

    fn cooldown_end(&self, user: &User, now: i64) -> Option<i64> {
        let last = user.last_support_at?;
        let ends_at = last.saturating_add(self.config.support_cooldown_ms);
        (now < ends_at).then_some(ends_at)
    }

    // -------------------------------------------------------------------------
    // SETTLEMENT
    // -------------------------------------------------------------------------

    /// Apply a session settlement atomically: teacher earnings, learner
    /// charges and the bank cut, persisted together with `prelude` records
    /// (the closing session and timer rows).
    ///
    /// Negative resulting balances are allowed and logged.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` before any mutation if a participant is missing.
    pub async fn apply_settlement(
        &self,
        session_id: Uuid,
        settlement: &Settlement,
        prelude: Commit,
        now: i64,
    ) -> Result<Vec<LedgerEntry>, EconomyError> {
        let mut ids = vec![settlement.a.user_id, settlement.b.user_id];
        ids.sort_unstable();
        ids.dedup();

        let cells = ids
            .iter()
            .map(|id| self.account(*id))
            .collect::<Result<Vec<_>, _>>()?;
        let mut guards: Vec<OwnedMutexGuard<Account>> = Vec::with_capacity(cells.len());
        for cell in cells {
            guards.push(cell.lock_owned().await);
        }
        let mut bank = self.bank.lock().await;

        let mut entries = Vec::new();
        for op in settlement.operations() {
            let Some(account) = guards.iter_mut().find(|g| g.user.id == op.user_id) else {
                continue;
            };
            let verb = if op.kind == EntryKind::Learning { "Learning" } else { "Teaching" };
            let description = format!("{verb} in session #{session_id}");
            let entry = account.apply(op.amount, op.kind, Some(session_id), description, now);
            entries.push(entry);
        }
        if settlement.bank_cut.is_positive() {
            bank.add(settlement.bank_cut);
        }

        let mut commit = prelude;
        commit.extend(guards.iter().map(|g| Record::User(g.user.clone())));
        commit.extend(entries.iter().cloned().map(Record::Entry));
        commit.push(Record::Bank(bank.balance()));
        self.journal.submit(commit).await;

        for account in &guards {
            if account.user.balance.is_negative() {
                warn!(
                    %session_id,
                    user_id = %account.user.id,
                    balance = %account.user.balance,
                    "ledger: settlement left balance negative"
                );
            }
        }
        info!(
            %session_id,
            entries = entries.len(),
            bank_cut = %settlement.bank_cut,
            bank = %bank.balance(),
            "ledger: settlement applied"
        );
        Ok(entries)
    }
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
