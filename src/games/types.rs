use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two daily draws
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    Morning,
    Evening,
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Morning => write!(f, "morning"),
            Session::Evening => write!(f, "evening"),
        }
    }
}

impl FromStr for Session {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "morning" | "am" => Ok(Session::Morning),
            "evening" | "pm" => Ok(Session::Evening),
            other => Err(format!("unknown session '{}'", other)),
        }
    }
}

/// A concrete session: local calendar date plus half of the day.
///
/// Ordering is chronological: morning of a date sorts before its evening.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId {
    pub date: NaiveDate,
    pub session: Session,
}

impl SessionId {
    pub fn new(date: NaiveDate, session: Session) -> Self {
        Self { date, session }
    }

    /// The session that follows this one
    pub fn next(self) -> Self {
        match self.session {
            Session::Morning => Self::new(self.date, Session::Evening),
            Session::Evening => Self::new(
                self.date.succ_opt().unwrap_or(self.date),
                Session::Morning,
            ),
        }
    }

    pub fn previous(self) -> Self {
        match self.session {
            Session::Morning => Self::new(
                self.date.pred_opt().unwrap_or(self.date),
                Session::Evening,
            ),
            Session::Evening => Self::new(self.date, Session::Morning),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.session)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// Ledger account. `balance` is in currency minor units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub balance: u64,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a wager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WagerStatus {
    Pending,
    Won { payout: u64, settled_at: DateTime<Utc> },
    Lost { settled_at: DateTime<Utc> },
    /// Returned to the owner by the stale-wager policy
    Refunded { settled_at: DateTime<Utc> },
}

impl WagerStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, WagerStatus::Pending)
    }
}

/// Final outcome applied when a wager leaves the pending partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WagerOutcome {
    Won { payout: u64 },
    Lost,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wager {
    pub id: String,
    pub owner: String,
    pub number: String,
    pub stake: u64,
    pub placed_at: DateTime<Utc>,
    /// Session label at placement; settlement recomputes membership from `placed_at`
    pub session: SessionId,
    #[serde(flatten)]
    pub status: WagerStatus,
}

impl Wager {
    /// Transition out of `Pending`. Returns `None` when the wager is already settled.
    pub fn retire(&self, outcome: WagerOutcome, at: DateTime<Utc>) -> Option<Wager> {
        if !self.status.is_pending() {
            return None;
        }
        let status = match outcome {
            WagerOutcome::Won { payout } => WagerStatus::Won {
                payout,
                settled_at: at,
            },
            WagerOutcome::Lost => WagerStatus::Lost { settled_at: at },
            WagerOutcome::Refunded => WagerStatus::Refunded { settled_at: at },
        };
        Some(Wager {
            status,
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Bet,
    TopUp,
    Withdraw,
    Win,
    Refund,
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HistoryKind::Bet => "bet",
            HistoryKind::TopUp => "topup",
            HistoryKind::Withdraw => "withdraw",
            HistoryKind::Win => "win",
            HistoryKind::Refund => "refund",
        };
        f.write_str(s)
    }
}

/// Informational only for bets: a bet entry stays `Pending` after its wager
/// is settled. The wager store holds the authoritative status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Pending,
    Completed,
}

/// Append-only audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: String,
    pub owner: String,
    pub kind: HistoryKind,
    pub amount: u64,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub status: HistoryStatus,
}

/// Persisted game state singleton
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStatus {
    pub current_session: SessionId,
    pub is_open: bool,
    pub is_manually_closed: bool,
    pub last_updated: DateTime<Utc>,
}

/// Public record of a declared draw
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WinResult {
    pub id: String,
    pub date: NaiveDate,
    pub session: Session,
    pub number: String,
    pub multiplier: u64,
    pub winners: u64,
    pub total_payout: u64,
    pub timestamp: DateTime<Utc>,
}

/// Why the betting gate is closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ClosedReason {
    /// Operator override
    ManuallyClosed,
    /// The book for the current session is being settled
    SettlementInProgress,
    DeadlinePassed { session: SessionId, cutoff: NaiveTime },
    /// The previous draw was settled before its cutoff; bets for `session`
    /// are taken from `opens_at`
    NotYetOpen { session: SessionId, opens_at: NaiveTime },
}

impl fmt::Display for ClosedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosedReason::ManuallyClosed => write!(f, "betting has been closed by the operator"),
            ClosedReason::SettlementInProgress => {
                write!(f, "results are being settled, betting reopens shortly")
            }
            ClosedReason::DeadlinePassed { session, cutoff } => write!(
                f,
                "betting for the {} session closed at {}",
                session,
                cutoff.format("%H:%M")
            ),
            ClosedReason::NotYetOpen { session, opens_at } => write!(
                f,
                "betting for the {} session opens at {}",
                session,
                opens_at.format("%H:%M")
            ),
        }
    }
}
