//! Session clock
//!
//! Bars are anchored to the session open in the exchange timezone
//! (09:15 Asia/Kolkata by default). Bucket boundaries are computed in UTC
//! from the local anchor so DST-observing zones still get whole-minute bars.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// NSE cash/derivatives open
pub const DEFAULT_SESSION_OPEN: NaiveTime = match NaiveTime::from_hms_opt(9, 15, 0) {
    Some(open) => open,
    None => panic!("invalid session open"),
};

/// Session open anchor in a specific timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    pub tz: Tz,
    pub open: NaiveTime,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self {
            tz: chrono_tz::Asia::Kolkata,
            open: DEFAULT_SESSION_OPEN,
        }
    }
}

impl SessionClock {
    pub fn new(tz: Tz, open: NaiveTime) -> Self {
        Self { tz, open }
    }

    /// Local trading date of a timestamp
    pub fn session_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.tz).date_naive()
    }

    /// Session open for the local date of `ts`, as a UTC instant
    pub fn anchor_for(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local_open = self.session_date(ts).and_time(self.open);
        self.tz
            .from_local_datetime(&local_open)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Start of the `width` bucket containing `ts`.
    ///
    /// Returns None when `ts` falls before the session open.
    pub fn bucket_start(&self, ts: DateTime<Utc>, width: Duration) -> Option<DateTime<Utc>> {
        let anchor = self.anchor_for(ts)?;
        if ts < anchor {
            return None;
        }
        let width_secs = width.num_seconds();
        if width_secs <= 0 {
            return Some(ts);
        }
        let elapsed = (ts - anchor).num_seconds();
        let buckets = elapsed / width_secs;
        Some(anchor + Duration::seconds(buckets * width_secs))
    }

    /// True when `a` and `b` fall on different local trading dates
    pub fn is_new_session(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.session_date(a) != self.session_date(b)
    }
}
