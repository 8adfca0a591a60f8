//! Settlement of a declared winning number
//!
//! A run closes the book, walks the pending partition once and settles each
//! wager in its own conditioned commit, then publishes a [`WinResult`] and
//! reopens betting. Retired wagers leave the pending partition, so running the
//! same declaration twice never pays anyone twice.

use crate::{
    config::{SettlementConfig, StaleWagerPolicy},
    errors::{LedgerResult, ValidationError},
    games::{
        expander::is_two_digit,
        status::GameStatusController,
        types::{
            GameStatus, HistoryKind, HistoryStatus, Session, Wager, WagerOutcome, WinResult,
        },
    },
    history,
    ledger::{prepare_credit, AccountLedger},
    metrics::LedgerMetrics,
    optimistic::retry_on_conflict,
    storage::{AtomicWrite, CommitOutcome, SharedStore},
    wager_store::{prepare_retire, WagerStore},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Credit paid to a winning wager
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Payout {
    pub account: String,
    pub wager_id: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub result: WinResult,
    pub payouts: Vec<Payout>,
    pub won: u64,
    pub lost: u64,
    /// Stale wagers whose stake was returned
    pub refunded: u64,
    /// Stale wagers retired without payout
    pub forfeited: u64,
    /// Pending wagers of the other session, left for a later run
    pub deferred: u64,
    pub status: GameStatus,
}

/// What a run does with one pending wager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Win { payout: u64 },
    Lose,
    Refund,
    Forfeit,
    Defer,
}

pub struct SettlementEngine {
    store: SharedStore,
    accounts: Arc<AccountLedger>,
    wagers: Arc<WagerStore>,
    status: Arc<GameStatusController>,
    config: SettlementConfig,
    metrics: Arc<LedgerMetrics>,
}

impl SettlementEngine {
    pub fn new(
        store: SharedStore,
        accounts: Arc<AccountLedger>,
        wagers: Arc<WagerStore>,
        status: Arc<GameStatusController>,
        config: SettlementConfig,
        metrics: Arc<LedgerMetrics>,
    ) -> Self {
        Self {
            store,
            accounts,
            wagers,
            status,
            config,
            metrics,
        }
    }

    pub fn default_multiplier(&self) -> u64 {
        self.config.default_multiplier
    }

    pub fn settle(
        &self,
        winning_number: &str,
        multiplier: u64,
        half: Session,
        now: DateTime<Utc>,
    ) -> LedgerResult<SettlementReport> {
        if !is_two_digit(winning_number) {
            return Err(ValidationError::InvalidNumber(winning_number.to_string()).into());
        }
        if multiplier == 0 || multiplier > self.config.max_multiplier {
            return Err(ValidationError::InvalidMultiplier {
                value: multiplier,
                max: self.config.max_multiplier,
            }
            .into());
        }

        self.status.mark_settling(now)?;
        tracing::info!(
            number = winning_number,
            multiplier,
            session = %half,
            "Settlement started"
        );

        let mut payouts = Vec::new();
        let (mut won, mut lost, mut refunded, mut forfeited, mut deferred) = (0, 0, 0, 0, 0);

        for item in self.wagers.scan_pending() {
            let pending = item?;
            let wager = &pending.value;
            let disposition = self.classify(wager, winning_number, multiplier, half, now)?;
            if disposition == Disposition::Defer {
                deferred += 1;
                continue;
            }

            if !self.apply(&wager.id, disposition, now)? {
                tracing::debug!(wager = %wager.id, "Wager already settled by another run");
                continue;
            }
            match disposition {
                Disposition::Win { payout } => {
                    won += 1;
                    payouts.push(Payout {
                        account: wager.owner.clone(),
                        wager_id: wager.id.clone(),
                        amount: payout,
                    });
                }
                Disposition::Lose => lost += 1,
                Disposition::Refund => refunded += 1,
                Disposition::Forfeit => forfeited += 1,
                Disposition::Defer => {}
            }
        }

        let total_payout = payouts
            .iter()
            .try_fold(0u64, |acc, p| acc.checked_add(p.amount))
            .ok_or(ValidationError::Overflow)?;
        let result = WinResult {
            id: Uuid::new_v4().to_string(),
            date: self.status.clock().latest_session(half, now).date,
            session: half,
            number: winning_number.to_string(),
            multiplier,
            winners: won,
            total_payout,
            timestamp: now,
        };
        let mut write = AtomicWrite::new();
        history::prepare_result(&mut write, &result)?;
        self.store.commit(write)?;

        let status = self.status.advance_after_settlement(half, now)?;
        self.metrics
            .record_settlement(won, lost + forfeited, refunded, total_payout);

        tracing::info!(
            number = winning_number,
            session = %half,
            won,
            lost,
            refunded,
            forfeited,
            deferred,
            total_payout,
            next_session = %status.current_session,
            "Settlement complete"
        );

        Ok(SettlementReport {
            result,
            payouts,
            won,
            lost,
            refunded,
            forfeited,
            deferred,
            status,
        })
    }

    fn classify(
        &self,
        wager: &Wager,
        winning_number: &str,
        multiplier: u64,
        half: Session,
        now: DateTime<Utc>,
    ) -> LedgerResult<Disposition> {
        if let Some(expire_after) = self.config.expire_after() {
            if now - wager.placed_at > expire_after {
                return Ok(match self.config.stale_wager_policy {
                    StaleWagerPolicy::Refund => Disposition::Refund,
                    StaleWagerPolicy::Forfeit => Disposition::Forfeit,
                    StaleWagerPolicy::Keep => Disposition::Defer,
                });
            }
        }

        if self.status.clock().window_of(wager.placed_at).session != half {
            return Ok(Disposition::Defer);
        }
        if wager.number != winning_number {
            return Ok(Disposition::Lose);
        }
        let payout = wager
            .stake
            .checked_mul(multiplier)
            .ok_or(ValidationError::Overflow)?;
        Ok(Disposition::Win { payout })
    }

    /// Settle one wager in its own commit. Returns false when it was no longer pending.
    fn apply(&self, wager_id: &str, disposition: Disposition, now: DateTime<Utc>) -> LedgerResult<bool> {
        let (outcome, credit) = match disposition {
            Disposition::Win { payout } => (WagerOutcome::Won { payout }, Some((payout, HistoryKind::Win))),
            Disposition::Lose | Disposition::Forfeit => (WagerOutcome::Lost, None),
            Disposition::Refund => (WagerOutcome::Refunded, None),
            Disposition::Defer => return Ok(false),
        };

        retry_on_conflict(self.config.max_commit_attempts, |attempt| {
            let Some(pending) = self.wagers.load_pending(wager_id)? else {
                return Ok(Some(false));
            };
            let mut write = AtomicWrite::new();
            let Some(settled) = prepare_retire(&mut write, &pending, outcome, now)? else {
                return Ok(Some(false));
            };

            let credit = match disposition {
                Disposition::Refund => Some((settled.stake, HistoryKind::Refund)),
                _ => credit,
            };
            if let Some((amount, kind)) = credit {
                let account = self.accounts.load(&settled.owner)?;
                prepare_credit(&mut write, &account, amount)?;
                let description = match kind {
                    HistoryKind::Refund => format!("Refund of expired bet on {}", settled.number),
                    _ => format!("Win on {} ({} session)", settled.number, settled.session.session),
                };
                let entry = history::new_entry(
                    &settled.owner,
                    kind,
                    amount,
                    description,
                    HistoryStatus::Completed,
                    now,
                );
                history::prepare_entry(&mut write, &entry)?;
            }

            match self.store.commit(write)? {
                CommitOutcome::Committed(_) => {
                    tracing::debug!(
                        wager = wager_id,
                        owner = %settled.owner,
                        outcome = ?outcome,
                        "Wager retired"
                    );
                    Ok(Some(true))
                }
                CommitOutcome::Conflict => {
                    self.metrics.record_conflict();
                    tracing::debug!(wager = wager_id, attempt, "Settlement commit conflicted");
                    Ok(None)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BettingConfig;
    use crate::errors::LedgerError;
    use crate::games::betting::BettingService;
    use crate::games::expander::{EdgePosition, Selector};
    use crate::games::types::{ClosedReason, Role, WagerOutcome, WagerStatus};
    use crate::history::AuditLog;
    use crate::storage::MemoryStore;
    use crate::test_support::{clock, march, session};

    struct Fixture {
        store: SharedStore,
        accounts: Arc<AccountLedger>,
        wagers: Arc<WagerStore>,
        status: Arc<GameStatusController>,
        betting: BettingService,
        engine: SettlementEngine,
    }

    fn fixture_with(config: SettlementConfig) -> Fixture {
        let store = MemoryStore::shared();
        let metrics = Arc::new(LedgerMetrics::new());
        let accounts = Arc::new(AccountLedger::new(store.clone(), 5));
        let wagers = Arc::new(WagerStore::new(store.clone(), 4, 5));
        let status = Arc::new(GameStatusController::new(store.clone(), clock(), 5));
        let betting = BettingService::new(
            store.clone(),
            accounts.clone(),
            status.clone(),
            BettingConfig::default(),
            metrics.clone(),
        );
        let engine = SettlementEngine::new(
            store.clone(),
            accounts.clone(),
            wagers.clone(),
            status.clone(),
            config,
            metrics,
        );
        Fixture {
            store,
            accounts,
            wagers,
            status,
            betting,
            engine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SettlementConfig::default())
    }

    fn funded(fx: &Fixture, id: &str, balance: u64) {
        fx.accounts.register(id, Role::User, march(5, 8, 0)).unwrap();
        fx.accounts.credit(id, balance).unwrap();
    }

    fn head(digit: &str) -> Selector {
        Selector::Edge {
            position: EdgePosition::Head,
            digit: digit.to_string(),
        }
    }

    #[test]
    fn test_head_bet_wins_on_55() {
        let fx = fixture();
        funded(&fx, "alice", 5000);
        fx.betting.place_bet("alice", &head("5"), 100, march(5, 10, 0)).unwrap();
        assert_eq!(fx.accounts.get_account("alice").unwrap().balance, 4000);

        let report = fx
            .engine
            .settle("55", 80, Session::Morning, march(5, 11, 50))
            .unwrap();

        assert_eq!(report.won, 1);
        assert_eq!(report.lost, 9);
        assert_eq!(report.deferred, 0);
        assert_eq!(report.result.total_payout, 8000);
        assert_eq!(report.payouts.len(), 1);
        assert_eq!(report.payouts[0].account, "alice");
        assert_eq!(fx.accounts.get_account("alice").unwrap().balance, 12_000);
        assert!(fx.wagers.pending_for("alice").unwrap().is_empty());

        let history = AuditLog::new(fx.store.clone()).history_page("alice", None, 50).unwrap();
        let wins: Vec<_> = history.items.iter().filter(|e| e.kind == HistoryKind::Win).collect();
        assert_eq!(wins.len(), 1);
        assert_eq!(wins[0].amount, 8000);
        // Losing bets keep their original pending history entry
        let bets = history.items.iter().filter(|e| e.kind == HistoryKind::Bet).count();
        assert_eq!(bets, 10);
    }

    #[test]
    fn test_full_balance_head_bet_then_win() {
        let fx = fixture();
        funded(&fx, "alice", 1000);

        let receipt = fx.betting.place_bet("alice", &head("5"), 100, march(5, 10, 0)).unwrap();
        assert_eq!(receipt.balance_after, 0);
        assert_eq!(fx.accounts.get_account("alice").unwrap().balance, 0);

        let report = fx.engine.settle("55", 80, Session::Morning, march(5, 11, 50)).unwrap();
        assert_eq!(report.won, 1);
        assert_eq!(report.lost, 9);
        assert_eq!(fx.accounts.get_account("alice").unwrap().balance, 8000);
    }

    #[test]
    fn test_each_winner_credited_once_and_other_session_untouched() {
        let fx = fixture();
        funded(&fx, "alice", 10_000);
        funded(&fx, "bob", 10_000);

        fx.betting.place_bet("alice", &Selector::parse("42").unwrap(), 100, march(5, 9, 0)).unwrap();
        fx.betting.place_bet("bob", &Selector::parse("42r").unwrap(), 200, march(5, 9, 30)).unwrap();
        // Evening window bet from after the morning cutoff
        let evening_receipt = fx
            .betting
            .place_bet("bob", &Selector::parse("42").unwrap(), 100, march(5, 12, 30))
            .unwrap();

        let report = fx
            .engine
            .settle("42", 80, Session::Morning, march(5, 12, 40))
            .unwrap();
        assert_eq!(report.won, 2);
        assert_eq!(report.lost, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(fx.accounts.get_account("alice").unwrap().balance, 10_000 - 100 + 8_000);
        assert_eq!(fx.accounts.get_account("bob").unwrap().balance, 10_000 - 400 - 100 + 16_000);

        let evening_wager = fx.wagers.get_wager(&evening_receipt.wager_ids[0]).unwrap().unwrap();
        assert_eq!(evening_wager.status, WagerStatus::Pending);
        assert_eq!(evening_wager.session, session(5, Session::Evening));
    }

    #[test]
    fn test_rerun_does_not_double_credit() {
        let fx = fixture();
        funded(&fx, "alice", 1000);
        fx.betting.place_bet("alice", &Selector::parse("07").unwrap(), 100, march(5, 10, 0)).unwrap();

        fx.engine.settle("07", 80, Session::Morning, march(5, 11, 50)).unwrap();
        let after_first = fx.accounts.get_account("alice").unwrap().balance;
        assert_eq!(after_first, 900 + 8000);

        let rerun = fx.engine.settle("07", 80, Session::Morning, march(5, 11, 55)).unwrap();
        assert_eq!(rerun.won, 0);
        assert!(rerun.payouts.is_empty());
        assert_eq!(fx.accounts.get_account("alice").unwrap().balance, after_first);
    }

    #[test]
    fn test_morning_settlement_reopens_for_evening() {
        let fx = fixture();
        funded(&fx, "alice", 1000);
        let report = fx.engine.settle("00", 80, Session::Morning, march(5, 11, 50)).unwrap();
        assert_eq!(report.status.current_session, session(5, Session::Evening));
        assert!(report.status.is_open);

        let receipt = fx
            .betting
            .place_bet("alice", &Selector::parse("11").unwrap(), 100, march(5, 11, 55))
            .unwrap();
        assert_eq!(receipt.session, session(5, Session::Evening));
    }

    #[test]
    fn test_bets_after_early_settlement_wait_for_next_window() {
        let fx = fixture();
        funded(&fx, "alice", 1000);
        fx.engine.settle("00", 80, Session::Morning, march(5, 10, 30)).unwrap();

        // The morning draw is already declared; the evening book opens at 11:45
        match fx.betting.place_bet("alice", &Selector::parse("42").unwrap(), 100, march(5, 11, 0)) {
            Err(LedgerError::SessionClosed(ClosedReason::NotYetOpen { session: s, .. })) => {
                assert_eq!(s, session(5, Session::Evening))
            }
            other => panic!("expected not yet open, got {:?}", other),
        }
        assert_eq!(fx.accounts.get_account("alice").unwrap().balance, 1000);

        let receipt = fx
            .betting
            .place_bet("alice", &Selector::parse("42").unwrap(), 100, march(5, 11, 50))
            .unwrap();
        assert_eq!(receipt.session, session(5, Session::Evening));

        let report = fx.engine.settle("42", 80, Session::Evening, march(5, 16, 0)).unwrap();
        assert_eq!(report.won, 1);
        assert_eq!(report.deferred, 0);
        assert_eq!(fx.accounts.get_account("alice").unwrap().balance, 900 + 8000);
    }

    #[test]
    fn test_evening_declared_after_midnight_keeps_session_date() {
        let fx = fixture();
        funded(&fx, "alice", 1000);
        fx.betting.place_bet("alice", &Selector::parse("18").unwrap(), 100, march(5, 13, 0)).unwrap();

        let report = fx.engine.settle("18", 80, Session::Evening, march(6, 0, 30)).unwrap();
        assert_eq!(report.won, 1);
        assert_eq!(report.result.date, chrono::NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
        assert_eq!(report.result.session, Session::Evening);
        assert_eq!(report.status.current_session, session(6, Session::Morning));
    }

    #[test]
    fn test_interrupted_run_completes_on_rerun() {
        let fx = fixture();
        funded(&fx, "alice", 1000);
        funded(&fx, "bob", 1000);
        let alice = fx
            .betting
            .place_bet("alice", &Selector::parse("42").unwrap(), 100, march(5, 9, 0))
            .unwrap();
        fx.betting.place_bet("bob", &Selector::parse("42r").unwrap(), 100, march(5, 9, 30)).unwrap();

        // A run that closed the book and retired one wager before stopping
        fx.status.mark_settling(march(5, 11, 50)).unwrap();
        fx.wagers
            .retire(&alice.wager_ids[0], WagerOutcome::Won { payout: 8000 }, march(5, 11, 50))
            .unwrap()
            .unwrap();
        assert!(matches!(
            fx.betting.place_bet("bob", &Selector::parse("11").unwrap(), 100, march(5, 11, 52)),
            Err(LedgerError::SessionClosed(ClosedReason::SettlementInProgress))
        ));

        let report = fx.engine.settle("42", 80, Session::Morning, march(5, 11, 55)).unwrap();
        assert_eq!(report.won, 1);
        assert_eq!(report.lost, 1);
        assert_eq!(report.payouts.len(), 1);
        assert_eq!(report.payouts[0].account, "bob");
        assert_eq!(fx.accounts.get_account("alice").unwrap().balance, 900);
        assert_eq!(fx.accounts.get_account("bob").unwrap().balance, 800 + 8000);
        assert_eq!(report.status.current_session, session(5, Session::Evening));
        assert!(report.status.is_open);

        let again = fx.engine.settle("42", 80, Session::Morning, march(5, 11, 58)).unwrap();
        assert_eq!(again.won + again.lost, 0);
        assert_eq!(fx.accounts.get_account("bob").unwrap().balance, 800 + 8000);
    }

    #[test]
    fn test_stale_wagers_refunded() {
        let fx = fixture();
        funded(&fx, "alice", 1000);
        fx.betting.place_bet("alice", &Selector::parse("13").unwrap(), 100, march(5, 13, 0)).unwrap();

        // Three days later the evening wager has never been settled
        let report = fx.engine.settle("99", 80, Session::Morning, march(8, 11, 50)).unwrap();
        assert_eq!(report.refunded, 1);
        assert_eq!(report.deferred, 0);
        assert_eq!(fx.accounts.get_account("alice").unwrap().balance, 1000);

        let history = AuditLog::new(fx.store.clone()).history_page("alice", None, 10).unwrap();
        assert_eq!(history.items[0].kind, HistoryKind::Refund);
    }

    #[test]
    fn test_keep_policy_defers_stale_wagers() {
        let fx = fixture_with(SettlementConfig {
            stale_wager_policy: StaleWagerPolicy::Keep,
            ..SettlementConfig::default()
        });
        funded(&fx, "alice", 1000);
        fx.betting.place_bet("alice", &Selector::parse("13").unwrap(), 100, march(5, 13, 0)).unwrap();

        let report = fx.engine.settle("13", 80, Session::Morning, march(8, 11, 50)).unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(fx.wagers.pending_for("alice").unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_declarations_rejected_before_closing_book() {
        let fx = fixture();
        assert!(matches!(
            fx.engine.settle("5", 80, Session::Morning, march(5, 11, 50)),
            Err(LedgerError::Validation(ValidationError::InvalidNumber(_)))
        ));
        assert!(matches!(
            fx.engine.settle("55", 0, Session::Morning, march(5, 11, 50)),
            Err(LedgerError::Validation(ValidationError::InvalidMultiplier { .. }))
        ));
        assert!(matches!(
            fx.engine.settle("55", 1001, Session::Morning, march(5, 11, 50)),
            Err(LedgerError::Validation(ValidationError::InvalidMultiplier { .. }))
        ));
    }

    #[test]
    fn test_results_are_published() {
        let fx = fixture();
        fx.engine.settle("31", 85, Session::Morning, march(5, 11, 50)).unwrap();
        fx.engine.settle("64", 80, Session::Evening, march(5, 16, 0)).unwrap();

        let results = AuditLog::new(fx.store.clone()).results_page(None, 10).unwrap();
        assert_eq!(results.items.len(), 2);
        assert_eq!(results.items[0].number, "64");
        assert_eq!(results.items[0].session, Session::Evening);
        assert_eq!(results.items[1].multiplier, 85);
        assert_eq!(results.items[1].date, chrono::NaiveDate::from_ymd_opt(2026, 3, 5).unwrap());
    }
}
