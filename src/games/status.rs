//! Game status singleton: current session, open flag and operator override
//!
//! The record lives under [`GAME_STATUS_KEY`] and every write is a
//! compare-and-swap on its version. Reads apply the clock-driven advance and
//! persist it, so the first request after the session boundary moves the game
//! forward.

use crate::{
    errors::{LedgerError, LedgerResult},
    games::{
        session_clock::SessionClock,
        types::{ClosedReason, GameStatus, Session},
    },
    optimistic::retry_on_conflict,
    storage::{get_json, AtomicWrite, CommitOutcome, SharedStore, Versioned},
};
use chrono::{DateTime, Utc};

pub const GAME_STATUS_KEY: &[u8] = b"gamestatus";

pub struct GameStatusController {
    store: SharedStore,
    clock: SessionClock,
    max_attempts: u32,
}

impl GameStatusController {
    pub fn new(store: SharedStore, clock: SessionClock, max_attempts: u32) -> Self {
        Self {
            store,
            clock,
            max_attempts,
        }
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// Current status with the clock-driven advance applied
    pub fn game_status(&self, now: DateTime<Utc>) -> LedgerResult<GameStatus> {
        self.update(now, |_| false)
    }

    /// Why betting is closed at `now`, or `None` when bets are accepted
    pub fn closed_reason(&self, status: &GameStatus, now: DateTime<Utc>) -> Option<ClosedReason> {
        if status.is_manually_closed {
            return Some(ClosedReason::ManuallyClosed);
        }
        if !status.is_open {
            return Some(ClosedReason::SettlementInProgress);
        }
        if !self.clock.is_before_deadline(status.current_session, now) {
            return Some(ClosedReason::DeadlinePassed {
                session: status.current_session,
                cutoff: self.clock.cutoff(status.current_session.session),
            });
        }
        let window = self.clock.window_of(now);
        if window < status.current_session {
            return Some(ClosedReason::NotYetOpen {
                session: status.current_session,
                opens_at: self.clock.cutoff(window.session),
            });
        }
        None
    }

    /// Status if betting is allowed at `now`, `SessionClosed` otherwise
    pub fn ensure_betting_allowed(&self, now: DateTime<Utc>) -> LedgerResult<GameStatus> {
        let status = self.game_status(now)?;
        match self.closed_reason(&status, now) {
            Some(reason) => Err(LedgerError::SessionClosed(reason)),
            None => Ok(status),
        }
    }

    pub fn set_manually_closed(&self, closed: bool, now: DateTime<Utc>) -> LedgerResult<GameStatus> {
        let status = self.update(now, |status| {
            let changed = status.is_manually_closed != closed;
            status.is_manually_closed = closed;
            changed
        })?;
        tracing::info!(closed, session = %status.current_session, "Manual betting override set");
        Ok(status)
    }

    /// Close the book while a settlement run is in progress
    pub fn mark_settling(&self, now: DateTime<Utc>) -> LedgerResult<GameStatus> {
        self.update(now, |status| {
            let changed = status.is_open;
            status.is_open = false;
            changed
        })
    }

    /// Reopen after settling `half`, moving past the settled session when it is
    /// the current one
    pub fn advance_after_settlement(
        &self,
        half: Session,
        now: DateTime<Utc>,
    ) -> LedgerResult<GameStatus> {
        let status = self.update(now, |status| {
            if status.current_session.session == half {
                status.current_session = status.current_session.next();
            }
            status.is_open = true;
            true
        })?;
        tracing::info!(
            settled = %half,
            session = %status.current_session,
            "Game status advanced after settlement"
        );
        Ok(status)
    }

    fn initial_status(&self, now: DateTime<Utc>) -> GameStatus {
        GameStatus {
            current_session: self.clock.session_at(now),
            is_open: true,
            is_manually_closed: false,
            last_updated: now,
        }
    }

    /// Move the stored session forward to the clock's session, never backwards
    fn advance_to_clock(&self, status: &mut GameStatus, now: DateTime<Utc>) -> bool {
        let clock_session = self.clock.session_at(now);
        if clock_session > status.current_session {
            tracing::info!(
                from = %status.current_session,
                to = %clock_session,
                "Session advanced by clock"
            );
            status.current_session = clock_session;
            status.is_open = true;
            return true;
        }
        false
    }

    /// Read, apply the clock advance and `mutate`, and write back when anything
    /// changed. `mutate` returns whether it changed the record.
    fn update<F>(&self, now: DateTime<Utc>, mut mutate: F) -> LedgerResult<GameStatus>
    where
        F: FnMut(&mut GameStatus) -> bool,
    {
        retry_on_conflict(self.max_attempts, |_| {
            let stored: Option<Versioned<GameStatus>> = get_json(&*self.store, GAME_STATUS_KEY)?;
            let (mut status, version, mut dirty) = match stored {
                Some(v) => (v.value, Some(v.version), false),
                None => (self.initial_status(now), None, true),
            };

            dirty |= self.advance_to_clock(&mut status, now);
            dirty |= mutate(&mut status);
            if !dirty {
                return Ok(Some(status));
            }

            status.last_updated = now;
            let mut write = AtomicWrite::new();
            write.check(GAME_STATUS_KEY, version);
            write.put_json(GAME_STATUS_KEY, &status)?;
            match self.store.commit(write)? {
                CommitOutcome::Committed(_) => Ok(Some(status)),
                CommitOutcome::Conflict => Ok(None),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_support::{clock, march, session};

    fn controller() -> GameStatusController {
        GameStatusController::new(MemoryStore::shared(), clock(), 5)
    }

    #[test]
    fn test_initial_status_follows_clock() {
        let games = controller();
        let status = games.game_status(march(5, 9, 0)).unwrap();
        assert_eq!(status.current_session, session(5, Session::Morning));
        assert!(status.is_open);
        assert!(!status.is_manually_closed);
    }

    #[test]
    fn test_auto_advance_is_persisted_and_forward_only() {
        let games = controller();
        games.game_status(march(5, 9, 0)).unwrap();

        let afternoon = games.game_status(march(5, 12, 30)).unwrap();
        assert_eq!(afternoon.current_session, session(5, Session::Evening));

        // An earlier instant never moves the session back
        let stale_read = games.game_status(march(5, 10, 0)).unwrap();
        assert_eq!(stale_read.current_session, session(5, Session::Evening));
    }

    #[test]
    fn test_gate_reasons() {
        let games = controller();

        assert!(games.ensure_betting_allowed(march(5, 10, 0)).is_ok());

        match games.ensure_betting_allowed(march(5, 11, 50)) {
            Err(LedgerError::SessionClosed(ClosedReason::DeadlinePassed { session: s, .. })) => {
                assert_eq!(s, session(5, Session::Morning))
            }
            other => panic!("expected deadline, got {:?}", other),
        }

        games.set_manually_closed(true, march(5, 12, 10)).unwrap();
        assert!(matches!(
            games.ensure_betting_allowed(march(5, 12, 15)),
            Err(LedgerError::SessionClosed(ClosedReason::ManuallyClosed))
        ));

        games.set_manually_closed(false, march(5, 12, 20)).unwrap();
        games.mark_settling(march(5, 12, 25)).unwrap();
        assert!(matches!(
            games.ensure_betting_allowed(march(5, 12, 30)),
            Err(LedgerError::SessionClosed(ClosedReason::SettlementInProgress))
        ));
    }

    #[test]
    fn test_morning_settlement_opens_evening_before_noon() {
        let games = controller();
        games.game_status(march(5, 9, 0)).unwrap();

        games.mark_settling(march(5, 11, 50)).unwrap();
        let status = games
            .advance_after_settlement(Session::Morning, march(5, 11, 52))
            .unwrap();
        assert_eq!(status.current_session, session(5, Session::Evening));
        assert!(status.is_open);

        // Still before the session boundary, betting is open for the evening
        assert!(games.ensure_betting_allowed(march(5, 11, 55)).is_ok());
    }

    #[test]
    fn test_early_settlement_holds_bets_until_window_opens() {
        let games = controller();
        games.game_status(march(5, 9, 0)).unwrap();

        games.mark_settling(march(5, 10, 30)).unwrap();
        games
            .advance_after_settlement(Session::Morning, march(5, 10, 30))
            .unwrap();

        match games.ensure_betting_allowed(march(5, 11, 0)) {
            Err(LedgerError::SessionClosed(ClosedReason::NotYetOpen { session: s, opens_at })) => {
                assert_eq!(s, session(5, Session::Evening));
                assert_eq!(opens_at, chrono::NaiveTime::from_hms_opt(11, 45, 0).unwrap());
            }
            other => panic!("expected not yet open, got {:?}", other),
        }
        assert!(games.ensure_betting_allowed(march(5, 11, 45)).is_ok());
    }

    #[test]
    fn test_settling_other_half_keeps_session() {
        let games = controller();
        games.game_status(march(5, 13, 0)).unwrap();

        let status = games
            .advance_after_settlement(Session::Morning, march(5, 13, 5))
            .unwrap();
        assert_eq!(status.current_session, session(5, Session::Evening));
        assert!(status.is_open);
    }

    #[test]
    fn test_evening_settlement_moves_to_next_day() {
        let games = controller();
        games.game_status(march(5, 13, 0)).unwrap();
        let status = games
            .advance_after_settlement(Session::Evening, march(5, 16, 0))
            .unwrap();
        assert_eq!(status.current_session, session(6, Session::Morning));
        assert!(games.ensure_betting_allowed(march(5, 18, 0)).is_ok());
    }
}
