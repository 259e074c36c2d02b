//! Settlement engine: converts teaching time into ledger operations.
//!
//! DESIGN
//! ======
//! `settle` is a pure function of the two participants' closed teaching
//! seconds and the configured rates. Only full five-minute blocks count.
//! Each learner pays the other side's full gross; the teacher receives the
//! gross minus the bank cut, and the bank receives both cuts.
//!
//! Cuts are truncated to the hundredth per teacher and the bank gets exactly
//! their sum, so total charges always equal total nets plus the bank cut.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EconomyConfig;
use crate::credits::Credits;
use crate::services::ledger::EntryKind;

/// Seconds of teaching per billable block.
pub const BLOCK_SECONDS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rates {
    pub credits_per_block: Credits,
    pub bank_cut_percent: u32,
}

impl From<&EconomyConfig> for Rates {
    fn from(config: &EconomyConfig) -> Self {
        Self { credits_per_block: config.credits_per_5_minutes, bank_cut_percent: config.bank_cut_percent }
    }
}

/// One participant's side of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub user_id: Uuid,
    pub teaching_seconds: i64,
    /// Full value of the teaching delivered.
    pub gross: Credits,
    /// Amount credited for teaching after the bank cut.
    pub net: Credits,
    /// Amount charged for learning (the partner's gross).
    pub charge: Credits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub a: Share,
    pub b: Share,
    pub bank_cut: Credits,
}

/// One signed balance change derived from a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerOp {
    pub user_id: Uuid,
    pub amount: Credits,
    pub kind: EntryKind,
}

/// Gross teaching value for `seconds`. Partial blocks are dropped.
#[must_use]
pub fn gross_for(seconds: i64, rates: Rates) -> Credits {
    let blocks = seconds.max(0) / BLOCK_SECONDS;
    rates.credits_per_block.times(blocks)
}

/// Settle a session from each participant's total teaching seconds.
#[must_use]
pub fn settle(a: (Uuid, i64), b: (Uuid, i64), rates: Rates) -> Settlement {
    let gross_a = gross_for(a.1, rates);
    let gross_b = gross_for(b.1, rates);
    let cut_a = gross_a.percent(rates.bank_cut_percent);
    let cut_b = gross_b.percent(rates.bank_cut_percent);

    Settlement {
        a: Share {
            user_id: a.0,
            teaching_seconds: a.1.max(0),
            gross: gross_a,
            net: gross_a - cut_a,
            charge: gross_b,
        },
        b: Share {
            user_id: b.0,
            teaching_seconds: b.1.max(0),
            gross: gross_b,
            net: gross_b - cut_b,
            charge: gross_a,
        },
        bank_cut: cut_a + cut_b,
    }
}

impl Settlement {
    /// Ledger operations in application order: earnings first, then
    /// charges. Zero amounts are omitted.
    #[must_use]
    pub fn operations(&self) -> Vec<LedgerOp> {
        let candidates = [
            LedgerOp { user_id: self.a.user_id, amount: self.a.net, kind: EntryKind::Teaching },
            LedgerOp { user_id: self.b.user_id, amount: self.b.net, kind: EntryKind::Teaching },
            LedgerOp { user_id: self.a.user_id, amount: -self.a.charge, kind: EntryKind::Learning },
            LedgerOp { user_id: self.b.user_id, amount: -self.b.charge, kind: EntryKind::Learning },
        ];
        candidates
            .into_iter()
            .filter(|op| op.amount != Credits::ZERO)
            .collect()
    }

    /// Total moved between the pair and the bank.
    #[must_use]
    pub fn total_charged(&self) -> Credits {
        self.a.charge + self.b.charge
    }
}

#[cfg(test)]
#[path = "settlement_test.rs"]
mod tests;
