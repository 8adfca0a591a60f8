//! Ledger counters exported in Prometheus text format

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-wide counters. Cheap to bump from any thread.
pub struct LedgerMetrics {
    started_at: Instant,
    bets_placed: AtomicU64,
    wagers_placed: AtomicU64,
    stake_total: AtomicU64,
    bets_rejected: AtomicU64,
    commit_conflicts: AtomicU64,
    settlements: AtomicU64,
    wagers_won: AtomicU64,
    wagers_lost: AtomicU64,
    wagers_refunded: AtomicU64,
    payout_total: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub bets_placed: u64,
    pub wagers_placed: u64,
    pub stake_total: u64,
    pub bets_rejected: u64,
    pub commit_conflicts: u64,
    pub settlements: u64,
    pub wagers_won: u64,
    pub wagers_lost: u64,
    pub wagers_refunded: u64,
    pub payout_total: u64,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            bets_placed: AtomicU64::new(0),
            wagers_placed: AtomicU64::new(0),
            stake_total: AtomicU64::new(0),
            bets_rejected: AtomicU64::new(0),
            commit_conflicts: AtomicU64::new(0),
            settlements: AtomicU64::new(0),
            wagers_won: AtomicU64::new(0),
            wagers_lost: AtomicU64::new(0),
            wagers_refunded: AtomicU64::new(0),
            payout_total: AtomicU64::new(0),
        }
    }

    pub fn record_bet(&self, wagers: usize, total_cost: u64) {
        self.bets_placed.fetch_add(1, Ordering::Relaxed);
        self.wagers_placed.fetch_add(wagers as u64, Ordering::Relaxed);
        self.stake_total.fetch_add(total_cost, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.bets_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.commit_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settlement(&self, won: u64, lost: u64, refunded: u64, payout: u64) {
        self.settlements.fetch_add(1, Ordering::Relaxed);
        self.wagers_won.fetch_add(won, Ordering::Relaxed);
        self.wagers_lost.fetch_add(lost, Ordering::Relaxed);
        self.wagers_refunded.fetch_add(refunded, Ordering::Relaxed);
        self.payout_total.fetch_add(payout, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            bets_placed: self.bets_placed.load(Ordering::Relaxed),
            wagers_placed: self.wagers_placed.load(Ordering::Relaxed),
            stake_total: self.stake_total.load(Ordering::Relaxed),
            bets_rejected: self.bets_rejected.load(Ordering::Relaxed),
            commit_conflicts: self.commit_conflicts.load(Ordering::Relaxed),
            settlements: self.settlements.load(Ordering::Relaxed),
            wagers_won: self.wagers_won.load(Ordering::Relaxed),
            wagers_lost: self.wagers_lost.load(Ordering::Relaxed),
            wagers_refunded: self.wagers_refunded.load(Ordering::Relaxed),
            payout_total: self.payout_total.load(Ordering::Relaxed),
        }
    }

    /// Render all counters in Prometheus text exposition format
    pub fn to_prometheus_format(&self) -> String {
        let s = self.snapshot();
        let rows: [(&str, &str, &str, u64); 11] = [
            ("uptime_seconds", "gauge", "Seconds since the process started", s.uptime_seconds),
            ("bets_placed_total", "counter", "Accepted bet requests", s.bets_placed),
            ("wagers_placed_total", "counter", "Wagers recorded by accepted bets", s.wagers_placed),
            ("stake_total", "counter", "Total amount debited for bets", s.stake_total),
            ("bets_rejected_total", "counter", "Bet requests refused by the betting gate", s.bets_rejected),
            ("commit_conflicts_total", "counter", "Compare-and-swap commits that lost a race", s.commit_conflicts),
            ("settlements_total", "counter", "Completed settlement runs", s.settlements),
            ("wagers_won_total", "counter", "Wagers settled as won", s.wagers_won),
            ("wagers_lost_total", "counter", "Wagers settled as lost", s.wagers_lost),
            ("wagers_refunded_total", "counter", "Stale wagers refunded", s.wagers_refunded),
            ("payout_total", "counter", "Total amount credited to winners", s.payout_total),
        ];

        let mut output = String::new();
        for (name, kind, help, value) in rows {
            output.push_str(&format!(
                "# HELP twod_{name} {help}\n# TYPE twod_{name} {kind}\ntwod_{name} {value}\n\n"
            ));
        }
        output
    }
}

impl Default for LedgerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
