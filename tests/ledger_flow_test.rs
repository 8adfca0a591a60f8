//! End-to-end ledger flow over the in-memory store: concurrent bets from many
//! accounts, morning settlement, and the evening session that follows.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use std::thread;
use twod_ledger::{
    games::{Role, Selector, Session, SessionId, WagerStatus},
    storage::MemoryStore,
    LedgerConfig, LedgerError, LedgerServices, ServiceBuilder,
};

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    let yangon = FixedOffset::east_opt(390 * 60).unwrap();
    yangon
        .with_ymd_and_hms(2026, 3, day, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

fn ledger() -> Arc<LedgerServices> {
    Arc::new(
        ServiceBuilder::new()
            .with_config(LedgerConfig::development())
            .with_store(MemoryStore::shared())
            .build()
            .expect("ledger should build"),
    )
}

#[test]
fn test_concurrent_bets_then_settlement() {
    let ledger = ledger();
    let now = at(10, 9, 0);

    for i in 0..8 {
        let id = format!("player{}", i);
        ledger.register(&id, Role::User, now).unwrap();
        ledger.top_up(&id, 10_000, now).unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                let id = format!("player{}", i);
                let number = if i % 2 == 0 { "55" } else { "12" };
                let selector = Selector::parse(number).unwrap();
                for _ in 0..5 {
                    ledger.place_bet(&id, &selector, 200, now).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..8 {
        let account = ledger.get_account(&format!("player{}", i)).unwrap();
        assert_eq!(account.balance, 10_000 - 5 * 200);
        assert_eq!(ledger.pending_for(&account.id).unwrap().len(), 5);
    }

    let report = ledger
        .settle("55", Some(85), Session::Morning, at(10, 11, 50))
        .unwrap();
    assert_eq!(report.won, 20);
    assert_eq!(report.lost, 20);
    assert_eq!(report.deferred, 0);
    assert_eq!(report.result.total_payout, 20 * 200 * 85);
    assert_eq!(
        report.status.current_session,
        SessionId::new(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(), Session::Evening)
    );
    assert!(report.status.is_open);

    for i in 0..8 {
        let account = ledger.get_account(&format!("player{}", i)).unwrap();
        let expected = if i % 2 == 0 {
            10_000 - 1_000 + 5 * 200 * 85
        } else {
            10_000 - 1_000
        };
        assert_eq!(account.balance, expected);
        assert!(ledger.pending_for(&account.id).unwrap().is_empty());
    }

    let metrics = ledger.metrics().snapshot();
    assert_eq!(metrics.bets_placed, 40);
    assert_eq!(metrics.wagers_won, 20);
    assert_eq!(metrics.payout_total, 20 * 200 * 85);

    let results = ledger.results_page(None, 10).unwrap();
    assert_eq!(results.items.len(), 1);
    assert_eq!(results.items[0].number, "55");
}

#[test]
fn test_evening_session_after_morning_settlement() {
    let ledger = ledger();
    ledger.register("alice", Role::User, at(10, 9, 0)).unwrap();
    ledger.top_up("alice", 5_000, at(10, 9, 0)).unwrap();

    let morning = ledger
        .place_bet("alice", &Selector::parse("07").unwrap(), 500, at(10, 9, 30))
        .unwrap();
    assert_eq!(morning.session.session, Session::Morning);

    // Past the morning cutoff the book is closed until settlement runs
    let err = ledger
        .place_bet("alice", &Selector::parse("07").unwrap(), 500, at(10, 11, 50))
        .unwrap_err();
    assert!(matches!(err, LedgerError::SessionClosed(_)));

    ledger
        .settle("30", None, Session::Morning, at(10, 12, 5))
        .unwrap();

    let evening = ledger
        .place_bet("alice", &Selector::parse("07r").unwrap(), 500, at(10, 13, 0))
        .unwrap();
    assert_eq!(evening.session.session, Session::Evening);
    assert_eq!(evening.wager_ids.len(), 2);
    assert_eq!(evening.balance_after, 5_000 - 500 - 1_000);

    let report = ledger
        .settle("70", None, Session::Evening, at(10, 16, 35))
        .unwrap();
    assert_eq!(report.won, 1);
    assert_eq!(report.lost, 1);
    assert_eq!(report.payouts[0].amount, 500 * 80);

    let won = ledger.get_wager(&report.payouts[0].wager_id).unwrap().unwrap();
    assert!(matches!(won.status, WagerStatus::Won { payout, .. } if payout == 40_000));

    let history = ledger.history_page("alice", None, 50).unwrap();
    assert_eq!(history.items[0].kind.to_string(), "win");
    assert!(history.next_cursor.is_none());
}

#[test]
fn test_manual_close_survives_settlement() {
    let ledger = ledger();
    ledger.register("bob", Role::User, at(11, 8, 0)).unwrap();
    ledger.top_up("bob", 1_000, at(11, 8, 0)).unwrap();

    ledger.set_manually_closed(true, at(11, 8, 30)).unwrap();
    ledger
        .settle("00", None, Session::Morning, at(11, 12, 10))
        .unwrap();

    let err = ledger
        .place_bet("bob", &Selector::parse("11").unwrap(), 100, at(11, 13, 0))
        .unwrap_err();
    assert!(matches!(err, LedgerError::SessionClosed(_)));
    assert_eq!(ledger.get_account("bob").unwrap().balance, 1_000);

    ledger.set_manually_closed(false, at(11, 13, 5)).unwrap();
    ledger
        .place_bet("bob", &Selector::parse("11").unwrap(), 100, at(11, 13, 10))
        .unwrap();
    assert_eq!(ledger.get_account("bob").unwrap().balance, 900);
}
