//! Shared fixtures for unit tests

use crate::config::SessionConfig;
use crate::games::session_clock::SessionClock;
use crate::games::types::{Session, SessionId};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

/// Wall time in the default operating zone (UTC+06:30) as a UTC instant
pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    FixedOffset::east_opt(390 * 60)
        .unwrap()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

/// Same as [`local`] on a March 2026 day
pub fn march(d: u32, h: u32, min: u32) -> DateTime<Utc> {
    local(2026, 3, d, h, min)
}

pub fn session(d: u32, half: Session) -> SessionId {
    SessionId::new(NaiveDate::from_ymd_opt(2026, 3, d).unwrap(), half)
}

pub fn clock() -> SessionClock {
    SessionClock::from_config(&SessionConfig::default()).unwrap()
}
