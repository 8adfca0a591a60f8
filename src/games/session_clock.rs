//! Wall-clock to session mapping in the operating time zone
//!
//! Two views of the same clock:
//! - [`SessionClock::session_at`] splits the local day at the session boundary
//!   (noon by default). Game status auto-advances on this split.
//! - [`SessionClock::window_of`] splits the timeline at the betting cutoffs. A
//!   wager belongs to the first session whose cutoff it precedes, so bets taken
//!   after an early settlement land in the session that is actually open.

use crate::config::{ConfigValidationError, SessionConfig};
use crate::games::types::{Session, SessionId};
use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};

#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    offset: FixedOffset,
    boundary: NaiveTime,
    morning_cutoff: NaiveTime,
    evening_cutoff: NaiveTime,
}

impl SessionClock {
    pub fn new(
        offset: FixedOffset,
        boundary: NaiveTime,
        morning_cutoff: NaiveTime,
        evening_cutoff: NaiveTime,
    ) -> Self {
        Self {
            offset,
            boundary,
            morning_cutoff,
            evening_cutoff,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigValidationError> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigValidationError::InvalidValue(format!(
                "utc_offset_minutes {} is not a valid offset",
                config.utc_offset_minutes
            ))
        })?;
        Ok(Self::new(
            offset,
            SessionConfig::parse_time("session_boundary", &config.session_boundary)?,
            SessionConfig::parse_time("morning_cutoff", &config.morning_cutoff)?,
            SessionConfig::parse_time("evening_cutoff", &config.evening_cutoff)?,
        ))
    }

    pub fn local(&self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        at.with_timezone(&self.offset)
    }

    /// Half-of-day session containing `at`
    pub fn session_at(&self, at: DateTime<Utc>) -> SessionId {
        let local = self.local(at);
        let session = if local.time() < self.boundary {
            Session::Morning
        } else {
            Session::Evening
        };
        SessionId::new(local.date_naive(), session)
    }

    /// Betting window `at` falls into, used for wager membership
    pub fn window_of(&self, at: DateTime<Utc>) -> SessionId {
        let local = self.local(at);
        let date = local.date_naive();
        let time = local.time();
        if time < self.morning_cutoff {
            SessionId::new(date, Session::Morning)
        } else if time < self.evening_cutoff {
            SessionId::new(date, Session::Evening)
        } else {
            SessionId::new(date, Session::Evening).next()
        }
    }

    /// Most recent `half` session whose betting window has opened by `at`.
    /// This is the draw a settlement of `half` at `at` declares.
    pub fn latest_session(&self, half: Session, at: DateTime<Utc>) -> SessionId {
        let window = self.window_of(at);
        if window.session == half {
            window
        } else {
            window.previous()
        }
    }

    pub fn cutoff(&self, session: Session) -> NaiveTime {
        match session {
            Session::Morning => self.morning_cutoff,
            Session::Evening => self.evening_cutoff,
        }
    }

    /// Instant after which no bet is accepted for `session`
    pub fn deadline(&self, session: SessionId) -> DateTime<Utc> {
        let local = session.date.and_time(self.cutoff(session.session));
        // Fixed offsets have no gaps or folds, so shifting by the offset is exact
        Utc.from_utc_datetime(&(local - self.offset_duration()))
    }

    pub fn is_before_deadline(&self, session: SessionId, now: DateTime<Utc>) -> bool {
        now < self.deadline(session)
    }

    fn offset_duration(&self) -> Duration {
        Duration::seconds(self.offset.local_minus_utc() as i64)
    }
}
