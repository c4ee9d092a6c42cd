//! Trading session boundaries
//!
//! CME index futures trade nearly around the clock; the session opens at
//! 18:00 Eastern the prior evening. Cumulative delta and bar indices are
//! keyed to the session date, not the calendar date, so a tick at 02:00 ET
//! still belongs to the session that opened the evening before.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::America::New_York;

/// Maps timestamps to session dates for a fixed session open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    session_open: NaiveTime,
}

impl SessionClock {
    pub fn new(session_open: NaiveTime) -> Self {
        Self { session_open }
    }

    /// Parse an "HH:MM" session open time.
    pub fn parse(s: &str) -> Option<Self> {
        let (h, m) = s.split_once(':')?;
        let hour: u32 = h.trim().parse().ok()?;
        let minute: u32 = m.trim().parse().ok()?;
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self::new)
    }

    pub fn session_open(&self) -> NaiveTime {
        self.session_open
    }

    /// Session date for a timestamp.
    ///
    /// Ticks at or after the session open belong to that calendar date's
    /// session; earlier ticks still belong to the session opened the previous
    /// evening. Evaluated in Eastern time regardless of the tick's wall clock.
    pub fn session_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        let et = ts.with_timezone(&New_York);
        if et.time() >= self.session_open {
            et.date_naive()
        } else {
            (et - Duration::days(1)).date_naive()
        }
    }

}

impl Default for SessionClock {
    fn default() -> Self {
        // 18:00 ET CME open
        Self::new(NaiveTime::from_hms_opt(18, 0, 0).unwrap())
    }
}
