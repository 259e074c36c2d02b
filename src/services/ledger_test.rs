use super::*;
use crate::services::settlement::{Rates, settle};

const T0: i64 = 1_700_000_000_000;

fn ledger() -> Ledger {
    Ledger::new(EconomyConfig::default(), Journal::disabled())
}

#[tokio::test]
async fn signup_grants_initial_credits() {
    let ledger = ledger();
    let user = ledger.open_account("alice", T0).await;
    assert_eq!(user.balance, Credits::whole(15));

    let entries = ledger.entries(user.id).await.expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::Signup);
    assert_eq!(entries[0].balance_after, Credits::whole(15));
}

#[tokio::test]
async fn running_balance_matches_entry_sum() {
    let ledger = ledger();
    let user = ledger.open_account_with("alice", Credits::whole(5), T0).await;

    let deltas = [250, -75, -1_000, 3, 600];
    for (i, delta) in deltas.into_iter().enumerate() {
        let kind = if delta > 0 { EntryKind::Teaching } else { EntryKind::Learning };
        let now = T0 + i64::try_from(i).expect("small") + 1;
        ledger
            .record(user.id, Credits::from_hundredths(delta), kind, None, None, now)
            .await
            .expect("record");
    }

    let mut oldest_first = ledger.entries(user.id).await.expect("entries");
    oldest_first.reverse();
    let mut running = Credits::ZERO;
    for entry in &oldest_first {
        running += entry.amount;
        assert_eq!(entry.balance_after, running);
    }
    assert_eq!(ledger.balance(user.id).await, Ok(running));
    assert_eq!(running, Credits::from_hundredths(500 + 250 - 75 - 1_000 + 3 + 600));
}

#[tokio::test]
async fn concurrent_records_lose_no_updates() {
    let ledger = Arc::new(ledger());
    let user_id = ledger.open_account_with("alice", Credits::ZERO, T0).await.id;

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let ledger = Arc::clone(&ledger);
        tasks.push(tokio::spawn(async move {
            ledger
                .record(user_id, Credits::from_hundredths(10), EntryKind::Teaching, None, None, T0)
                .await
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("record");
    }
    assert_eq!(ledger.balance(user_id).await, Ok(Credits::whole(5)));
    assert_eq!(ledger.entries(user_id).await.map(|e| e.len()), Ok(50));
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let ledger = ledger();
    let ghost = Uuid::new_v4();
    assert_eq!(ledger.balance(ghost).await, Err(EconomyError::UserNotFound(ghost)));
    assert!(ledger.user(ghost).await.is_none());
    assert_eq!(
        ledger
            .record(ghost, Credits::whole(1), EntryKind::Teaching, None, None, T0)
            .await,
        Err(EconomyError::UserNotFound(ghost))
    );
}

#[tokio::test]
async fn donation_moves_credits_to_bank() {
    let ledger = ledger();
    let user = ledger.open_account_with("alice", Credits::whole(5), T0).await;

    let receipt = ledger.donate(user.id, Credits::whole(3), T0).await.expect("donate");
    assert_eq!(receipt.entry.kind, EntryKind::Donation);
    assert_eq!(receipt.entry.amount, Credits::whole(-3));
    assert_eq!(receipt.balance, Credits::whole(2));
    assert_eq!(receipt.bank_balance, Credits::whole(103));
    assert_eq!(ledger.balance(user.id).await, Ok(Credits::whole(2)));
    assert_eq!(ledger.bank_balance().await, Credits::whole(103));
}

#[tokio::test]
async fn donation_beyond_balance_is_rejected() {
    let ledger = ledger();
    let user = ledger.open_account_with("alice", Credits::whole(5), T0).await;

    assert_eq!(
        ledger.donate(user.id, Credits::whole(6), T0).await,
        Err(EconomyError::InsufficientFunds { needed: Credits::whole(6), available: Credits::whole(5) })
    );
    assert!(matches!(
        ledger.donate(user.id, Credits::ZERO, T0).await,
        Err(EconomyError::MalformedInput(_))
    ));
    assert_eq!(ledger.balance(user.id).await, Ok(Credits::whole(5)));
    assert_eq!(ledger.bank_balance().await, Credits::whole(100));
}

#[tokio::test]
async fn concurrent_donations_each_report_their_own_bank_balance() {
    let ledger = Arc::new(ledger());
    let mut tasks = Vec::new();
    for i in 0..10 {
        let ledger = Arc::clone(&ledger);
        let user_id = ledger.open_account_with(&format!("donor{i}"), Credits::whole(5), T0).await.id;
        tasks.push(tokio::spawn(async move { ledger.donate(user_id, Credits::whole(1), T0).await }));
    }

    let mut seen = Vec::new();
    for task in tasks {
        seen.push(task.await.expect("join").expect("donate").bank_balance);
    }
    seen.sort();
    let expected: Vec<Credits> = (101..=110).map(Credits::whole).collect();
    assert_eq!(seen, expected);
}

#[test]
fn support_tiers() {
    assert_eq!(Bank::support_amount(Credits::ZERO), Credits::whole(6));
    assert_eq!(Bank::support_amount(Credits::whole(-2)), Credits::whole(6));
    assert_eq!(Bank::support_amount(Credits::from_hundredths(150)), Credits::whole(4));
    assert_eq!(Bank::support_amount(Credits::whole(2)), Credits::whole(4));
    assert_eq!(Bank::support_amount(Credits::from_hundredths(250)), Credits::whole(2));
    assert_eq!(Bank::support_amount(Credits::whole(3)), Credits::whole(2));
    assert_eq!(Bank::support_amount(Credits::from_hundredths(350)), Credits::ZERO);
}

#[tokio::test]
async fn support_grant_and_cooldown() {
    let ledger = ledger();
    let user = ledger.open_account_with("alice", Credits::from_hundredths(150), T0).await;

    let receipt = ledger.request_support(user.id, T0).await.expect("support");
    assert_eq!(receipt.entry.amount, Credits::whole(4));
    assert_eq!(receipt.entry.description, "Bank support (4.00 credits)");
    assert_eq!(receipt.bank_balance, Credits::whole(96));
    assert_eq!(ledger.bank_balance().await, Credits::whole(96));

    // Spend back down so the tier applies again; cooldown still blocks.
    ledger
        .record(user.id, Credits::whole(-5), EntryKind::Learning, None, None, T0)
        .await
        .expect("record");
    assert_eq!(
        ledger.request_support(user.id, T0 + 60_000).await,
        Err(EconomyError::NotEligible("support cooldown active"))
    );

    let status = ledger.bank_status(user.id, T0 + 60_000).await.expect("status");
    assert!(!status.can_request_support);
    assert_eq!(status.cooldown_ends_at, Some(T0 + 24 * 60 * 60 * 1000));

    let after = T0 + 24 * 60 * 60 * 1000;
    let receipt = ledger.request_support(user.id, after).await.expect("support after cooldown");
    assert_eq!(receipt.entry.amount, Credits::whole(4));
}

#[tokio::test]
async fn support_above_threshold_is_not_eligible() {
    let ledger = ledger();
    let user = ledger.open_account_with("alice", Credits::from_hundredths(350), T0).await;
    assert_eq!(
        ledger.request_support(user.id, T0).await,
        Err(EconomyError::NotEligible("balance above support threshold"))
    );
    let status = ledger.bank_status(user.id, T0).await.expect("status");
    assert_eq!(status.support_amount, Credits::ZERO);
    assert_eq!(status.reason, Some("balance above support threshold"));
}

#[tokio::test]
async fn support_requires_bank_funds() {
    let config = EconomyConfig { initial_bank_credits: Credits::whole(5), ..EconomyConfig::default() };
    let ledger = Ledger::new(config, Journal::disabled());
    let user = ledger.open_account_with("alice", Credits::ZERO, T0).await;

    assert_eq!(
        ledger.request_support(user.id, T0).await,
        Err(EconomyError::InsufficientFunds { needed: Credits::whole(6), available: Credits::whole(5) })
    );
    assert_eq!(ledger.balance(user.id).await, Ok(Credits::ZERO));
    assert_eq!(ledger.user(user.id).await.and_then(|u| u.last_support_at), None);
}

#[tokio::test]
async fn settlement_applies_all_operations_and_bank_cut() {
    let ledger = ledger();
    let a = ledger.open_account_with("alice", Credits::whole(15), T0).await;
    let b = ledger.open_account_with("bob", Credits::whole(15), T0).await;
    let session_id = Uuid::new_v4();
    let settlement = settle(
        (a.id, 900),
        (b.id, 600),
        Rates { credits_per_block: Credits::whole(1), bank_cut_percent: 10 },
    );

    let entries = ledger
        .apply_settlement(session_id, &settlement, Commit::new(), T0)
        .await
        .expect("settle");
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.session_id == Some(session_id)));

    assert_eq!(ledger.balance(a.id).await, Ok(Credits::from_hundredths(1570)));
    assert_eq!(ledger.balance(b.id).await, Ok(Credits::from_hundredths(1380)));
    assert_eq!(ledger.bank_balance().await, Credits::from_hundredths(10_050));
}

#[tokio::test]
async fn settlement_may_leave_balance_negative() {
    let ledger = ledger();
    let a = ledger.open_account_with("alice", Credits::whole(1), T0).await;
    let b = ledger.open_account_with("bob", Credits::whole(1), T0).await;
    let settlement = settle(
        (a.id, 3_600),
        (b.id, 0),
        Rates { credits_per_block: Credits::whole(1), bank_cut_percent: 10 },
    );

    ledger
        .apply_settlement(Uuid::new_v4(), &settlement, Commit::new(), T0)
        .await
        .expect("settle");
    assert_eq!(ledger.balance(b.id).await, Ok(Credits::whole(-11)));
}

#[tokio::test]
async fn settlement_with_unknown_user_changes_nothing() {
    let ledger = ledger();
    let a = ledger.open_account_with("alice", Credits::whole(15), T0).await;
    let ghost = Uuid::new_v4();
    let settlement = settle(
        (a.id, 600),
        (ghost, 600),
        Rates { credits_per_block: Credits::whole(1), bank_cut_percent: 10 },
    );

    assert_eq!(
        ledger
            .apply_settlement(Uuid::new_v4(), &settlement, Commit::new(), T0)
            .await,
        Err(EconomyError::UserNotFound(ghost))
    );
    assert_eq!(ledger.balance(a.id).await, Ok(Credits::whole(15)));
    assert_eq!(ledger.bank_balance().await, Credits::whole(100));
}

#[tokio::test]
async fn presence_is_stamped() {
    let ledger = ledger();
    let user = ledger.open_account("alice", T0).await;
    ledger.refresh_presence(user.id, T0 + 5, || true).await;

    let user = ledger.user(user.id).await.expect("user");
    assert!(user.is_online);
    assert_eq!(user.last_seen, Some(T0 + 5));
}

#[test]
fn entry_kind_names_match_storage() {
    for kind in [
        EntryKind::Teaching,
        EntryKind::Learning,
        EntryKind::Signup,
        EntryKind::Support,
        EntryKind::BankCut,
        EntryKind::Donation,
    ] {
        assert_eq!(EntryKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(EntryKind::parse("refund"), None);
}
