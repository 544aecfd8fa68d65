//! Rolling sync window, aligned to calendar weeks.

use std::fmt;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{SyncError, SyncResult};

pub const DEFAULT_WEEKS_FORWARD: u32 = 2;
pub const DEFAULT_WEEKS_BACK: u32 = 0;

/// How far the wide window reaches past each end of the sync window.
const WIDE_MARGIN: Months = Months::new(6);

/// The `[time_min, time_max]` range of source events to mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncWindow {
    pub time_min: DateTime<Tz>,
    pub time_max: DateTime<Tz>,
}

impl SyncWindow {
    /// Window starting on Monday 00:00:00 `weeks_back` weeks before the
    /// current week and ending Sunday 23:59:59 of the last forward week.
    ///
    /// `weeks_forward` counts the current week, so it must be at least 1.
    pub fn compute(now: DateTime<Tz>, weeks_forward: u32, weeks_back: u32) -> SyncResult<Self> {
        if weeks_forward == 0 {
            return Err(SyncError::InvalidWindow(
                "weeks_forward must be at least 1 (the current week)".into(),
            ));
        }

        let tz = now.timezone();
        let today = now.date_naive();
        let monday = today - Days::new(u64::from(today.weekday().num_days_from_monday()));

        let first_day = monday
            .checked_sub_days(Days::new(7 * u64::from(weeks_back)))
            .ok_or_else(|| SyncError::InvalidWindow(format!("{weeks_back} weeks back is out of range")))?;
        let last_day = monday
            .checked_add_days(Days::new(7 * u64::from(weeks_forward) - 1))
            .ok_or_else(|| {
                SyncError::InvalidWindow(format!("{weeks_forward} weeks forward is out of range"))
            })?;

        Ok(SyncWindow {
            time_min: local_instant(&tz, start_of_day(first_day)?),
            time_max: local_instant(&tz, end_of_day(last_day)?),
        })
    }

    /// The sync window grown by six months on each side, used to find
    /// destination events that drifted outside the nominal range.
    pub fn wide(&self) -> SyncResult<SyncWindow> {
        let time_min = self
            .time_min
            .checked_sub_months(WIDE_MARGIN)
            .ok_or_else(|| SyncError::InvalidWindow("wide window start out of range".into()))?;
        let time_max = self
            .time_max
            .checked_add_months(WIDE_MARGIN)
            .ok_or_else(|| SyncError::InvalidWindow("wide window end out of range".into()))?;
        Ok(SyncWindow { time_min, time_max })
    }

    /// Whether an instant falls in `[time_min, time_max)`.
    pub fn contains(&self, instant: &DateTime<Tz>) -> bool {
        *instant >= self.time_min && *instant < self.time_max
    }

    pub fn timezone(&self) -> Tz {
        self.time_min.timezone()
    }

    pub fn utc_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.time_min.with_timezone(&Utc),
            self.time_max.with_timezone(&Utc),
        )
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {} ({})",
            self.time_min.format("%a %Y-%m-%d %H:%M:%S"),
            self.time_max.format("%a %Y-%m-%d %H:%M:%S"),
            self.timezone()
        )
    }
}

fn start_of_day(date: NaiveDate) -> SyncResult<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
        .ok_or_else(|| SyncError::InvalidWindow(format!("no midnight on {date}")))
}

fn end_of_day(date: NaiveDate) -> SyncResult<NaiveDateTime> {
    date.and_hms_opt(23, 59, 59)
        .ok_or_else(|| SyncError::InvalidWindow(format!("no end of day on {date}")))
}

/// Resolve a wall-clock time, skipping forward over a DST gap.
fn local_instant(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}
