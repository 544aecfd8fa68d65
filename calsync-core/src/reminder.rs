//! Reminder event ahead of an OAuth token's estimated expiry.
//!
//! Google refresh tokens issued to an unverified ("testing") OAuth app die
//! after 7 days; production tokens go stale after about 6 months without use.
//! Neither is reported by the API, so the expiry is estimated from when the
//! token file was last written.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, DurationRound, Months, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::client::{CalendarClient, CalendarRef, cancellable};
use crate::error::SyncResult;
use crate::event::{
    Event, EventKind, EventSpan, Reminders, TOKEN_REMINDER_KEY, TRACKING_KEY, Transparency,
};
use crate::reconcile::MutationKind;

pub const REMINDER_TITLE: &str = "Refresh OAuth token for calendar sync";

const TESTING_MODE_DAYS: i64 = 7;
const PRODUCTION_LIFETIME: Months = Months::new(6);
const LEAD_DAYS: i64 = 2;
/// UTC hour of the reminder once less than a day remains.
const OVERDUE_HOUR: u32 = 9;
/// Reminders further out than this are not created.
const HORIZON: Months = Months::new(6);

/// Reports when a credential was last refreshed.
pub trait CredentialInspector: Send + Sync {
    /// `None` when there is no credential to inspect.
    fn last_refreshed(&self) -> SyncResult<Option<DateTime<Utc>>>;
}

/// A token file whose modification time marks the last refresh.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TokenFile { path: path.into() }
    }
}

impl CredentialInspector for TokenFile {
    fn last_refreshed(&self) -> SyncResult<Option<DateTime<Utc>>> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(DateTime::<Utc>::from(meta.modified()?))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryEstimate {
    TestingMode,
    Production,
}

impl fmt::Display for ExpiryEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryEstimate::TestingMode => {
                write!(f, "7 days from last refresh (testing mode estimate)")
            }
            ExpiryEstimate::Production => {
                write!(f, "6 months from last refresh (production mode estimate)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPlan {
    pub expires_at: DateTime<Utc>,
    pub remind_at: DateTime<Utc>,
    pub estimate: ExpiryEstimate,
}

/// Work out when to remind, or `None` if no reminder is due within six months.
///
/// Times are whole minutes and stay put between passes on the same UTC day.
pub fn plan_reminder(now: DateTime<Utc>, last_refreshed: DateTime<Utc>) -> Option<ReminderPlan> {
    let minute = TimeDelta::minutes(1);
    let last_refreshed = last_refreshed.duration_trunc(minute).ok()?;
    let testing_lifetime = TimeDelta::days(TESTING_MODE_DAYS);
    let (expires_at, estimate) = if now - last_refreshed < testing_lifetime {
        (last_refreshed + testing_lifetime, ExpiryEstimate::TestingMode)
    } else {
        (
            last_refreshed.checked_add_months(PRODUCTION_LIFETIME)?,
            ExpiryEstimate::Production,
        )
    };

    let days_left = (expires_at - now).num_days();
    let remind_at = if days_left > LEAD_DAYS {
        expires_at - TimeDelta::days(LEAD_DAYS)
    } else if days_left > 0 {
        expires_at - TimeDelta::days(1)
    } else {
        now.date_naive().and_hms_opt(OVERDUE_HOUR, 0, 0)?.and_utc()
    };

    if remind_at > now.checked_add_months(HORIZON)? {
        return None;
    }

    Some(ReminderPlan {
        expires_at,
        remind_at,
        estimate,
    })
}

impl ReminderPlan {
    /// The one-hour reminder event for `destination`.
    pub fn to_event(&self, destination: &str) -> Event {
        let start = self.remind_at.fixed_offset();
        Event {
            id: String::new(),
            summary: REMINDER_TITLE.to_string(),
            description: Some(format!(
                "The OAuth token calsync uses for destination '{destination}' is expected to expire on {}.\n\
                 Expiry estimated as {}.\n\
                 Re-authorize and replace the token file before then to keep the calendar in sync.",
                self.expires_at.format("%Y-%m-%d %H:%M UTC"),
                self.estimate,
            )),
            location: None,
            span: EventSpan::Timed {
                start,
                end: start + TimeDelta::hours(1),
            },
            transparency: Transparency::Opaque,
            kind: EventKind::Default,
            recurring_event_id: None,
            private_properties: BTreeMap::from([(
                TRACKING_KEY.to_string(),
                TOKEN_REMINDER_KEY.to_string(),
            )]),
            reminders: Reminders::UseDefault,
            attendees: Vec::new(),
            conference: None,
        }
    }
}

/// Create or refresh the reminder event in `calendar`.
///
/// Returns the write performed, or `None` if the existing reminder was current.
pub async fn upsert_reminder(
    client: &dyn CalendarClient,
    calendar: &CalendarRef,
    reminder: &Event,
    cancel: &CancellationToken,
) -> SyncResult<Option<MutationKind>> {
    let existing = cancellable(
        cancel,
        client.find_events_by_tracking_key(calendar, TOKEN_REMINDER_KEY),
    )
    .await?;

    match existing.first() {
        Some(current) if current.first_difference(reminder).is_none() => Ok(None),
        Some(current) => {
            cancellable(cancel, client.update_event(calendar, &current.id, reminder)).await?;
            Ok(Some(MutationKind::Update))
        }
        None => {
            cancellable(cancel, client.insert_event(calendar, reminder)).await?;
            Ok(Some(MutationKind::Create))
        }
    }
}
