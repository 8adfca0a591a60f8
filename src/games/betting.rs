//! Bet placement
//!
//! A bet debits `stake × numbers` once and records one pending wager plus one
//! history entry per number, all in a single conditioned commit. Either all of
//! it lands or none of it does.

use crate::{
    config::BettingConfig,
    errors::{LedgerError, LedgerResult, ValidationError},
    games::{
        expander::{expand, Selector},
        status::GameStatusController,
        types::{HistoryKind, HistoryStatus, SessionId, Wager, WagerStatus},
    },
    history,
    ledger::{prepare_debit, AccountLedger},
    metrics::LedgerMetrics,
    optimistic::retry_on_conflict,
    storage::{AtomicWrite, CommitOutcome, SharedStore},
    wager_store::prepare_record,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// What an accepted bet did
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BetReceipt {
    pub numbers: Vec<String>,
    pub wager_ids: Vec<String>,
    pub session: SessionId,
    pub stake_per_number: u64,
    pub total_cost: u64,
    pub balance_after: u64,
}

pub struct BettingService {
    store: SharedStore,
    accounts: Arc<AccountLedger>,
    status: Arc<GameStatusController>,
    limits: BettingConfig,
    metrics: Arc<LedgerMetrics>,
}

impl BettingService {
    pub fn new(
        store: SharedStore,
        accounts: Arc<AccountLedger>,
        status: Arc<GameStatusController>,
        limits: BettingConfig,
        metrics: Arc<LedgerMetrics>,
    ) -> Self {
        Self {
            store,
            accounts,
            status,
            limits,
            metrics,
        }
    }

    pub fn place_bet(
        &self,
        account_id: &str,
        selector: &Selector,
        stake: u64,
        now: DateTime<Utc>,
    ) -> LedgerResult<BetReceipt> {
        if let Err(e) = self.status.ensure_betting_allowed(now) {
            if matches!(e, LedgerError::SessionClosed(_)) {
                self.metrics.record_rejection();
            }
            return Err(e);
        }

        let numbers: Vec<String> = expand(selector).into_iter().collect();
        if numbers.is_empty() {
            return Err(ValidationError::InvalidSelection(selector.to_string()).into());
        }
        if stake < self.limits.min_stake || stake > self.limits.max_stake {
            return Err(ValidationError::InvalidAmount {
                amount: stake,
                min: self.limits.min_stake,
                max: self.limits.max_stake,
            }
            .into());
        }
        let total_cost = stake
            .checked_mul(numbers.len() as u64)
            .ok_or(ValidationError::Overflow)?;

        let session = self.status.clock().window_of(now);
        let wagers: Vec<Wager> = numbers
            .iter()
            .map(|number| Wager {
                id: Uuid::new_v4().to_string(),
                owner: account_id.to_string(),
                number: number.clone(),
                stake,
                placed_at: now,
                session,
                status: WagerStatus::Pending,
            })
            .collect();
        let entries: Vec<_> = wagers
            .iter()
            .map(|wager| {
                history::new_entry(
                    account_id,
                    HistoryKind::Bet,
                    wager.stake,
                    format!("Bet on {} ({} session)", wager.number, wager.session.session),
                    HistoryStatus::Pending,
                    now,
                )
            })
            .collect();

        let account = retry_on_conflict(self.limits.max_commit_attempts, |attempt| {
            let current = self.accounts.load(account_id)?;
            let mut write = AtomicWrite::new();
            let updated = prepare_debit(&mut write, &current, total_cost)?;
            for wager in &wagers {
                prepare_record(&mut write, wager)?;
            }
            for entry in &entries {
                history::prepare_entry(&mut write, entry)?;
            }
            match self.store.commit(write)? {
                CommitOutcome::Committed(_) => Ok(Some(updated)),
                CommitOutcome::Conflict => {
                    self.metrics.record_conflict();
                    tracing::debug!(account = account_id, attempt, "Bet commit conflicted");
                    Ok(None)
                }
            }
        })?;

        self.metrics.record_bet(wagers.len(), total_cost);
        tracing::info!(
            account = account_id,
            selector = %selector,
            wagers = wagers.len(),
            total_cost,
            balance = account.balance,
            session = %session,
            "Bet placed"
        );

        Ok(BetReceipt {
            numbers,
            wager_ids: wagers.into_iter().map(|w| w.id).collect(),
            session,
            stake_per_number: stake,
            total_cost,
            balance_after: account.balance,
        })
    }
}
