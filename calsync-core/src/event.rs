//! Provider-neutral event types.
//!
//! Providers convert their API responses (Google Calendar JSON, CalDAV
//! iCalendar) into these types, and the reconciler works exclusively with
//! them for filtering, matching and writing.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Private property carrying the source event id on every synced event.
pub const TRACKING_KEY: &str = "workEventId";

/// Reserved tracking value for the token-expiry reminder event.
pub const TOKEN_REMINDER_KEY: &str = "TOKEN_REFRESH_REMINDER";

/// A calendar event (provider-neutral)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Provider-assigned identifier. Empty for events not yet inserted.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub span: EventSpan,
    #[serde(default)]
    pub transparency: Transparency,
    #[serde(default)]
    pub kind: EventKind,

    /// Id of the series this instance was expanded from.
    pub recurring_event_id: Option<String>,

    /// Private extended properties (Google) or X- properties (CalDAV).
    #[serde(default)]
    pub private_properties: BTreeMap<String, String>,

    #[serde(default)]
    pub reminders: Reminders,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    /// Conferencing metadata, passed through untouched.
    pub conference: Option<Conference>,
}

/// When an event happens: either whole days or a timed range, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventSpan {
    /// All-day event. `end` is exclusive, as in Google Calendar and iCalendar.
    AllDay { start: NaiveDate, end: NaiveDate },
    Timed {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    },
}

/// Event transparency (busy/free status)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transparency {
    /// Event blocks time on calendar (default)
    #[default]
    Opaque,
    /// Event does not block time (shows as free)
    Transparent,
}

/// Explicit event category reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[default]
    Default,
    OutOfOffice,
    FocusTime,
    WorkingLocation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reminders {
    /// Use the destination calendar's default reminders
    #[default]
    UseDefault,
    /// Minutes before the event
    Overrides(Vec<i64>),
}

/// An event attendee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: Option<String>,
    pub email: String,
}

/// Conferencing metadata (e.g. a Google Meet block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conference {
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
    /// Provider fields calsync does not interpret (conference id, solution, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// "video", "phone", "sip", "more"
    pub entry_point_type: String,
    pub uri: String,
    pub label: Option<String>,
}

impl Event {
    /// The source event id this event was synced from, if any.
    pub fn tracking_key(&self) -> Option<&str> {
        self.private_properties
            .get(TRACKING_KEY)
            .map(String::as_str)
            .filter(|k| !k.is_empty())
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self.span, EventSpan::AllDay { .. })
    }

    /// URI of the first video entry point, which is what users click to join.
    pub fn meeting_link(&self) -> Option<&str> {
        self.conference.as_ref()?.entry_points.iter().find_map(|ep| {
            (ep.entry_point_type == "video" && !ep.uri.is_empty()).then_some(ep.uri.as_str())
        })
    }

    /// Start instant, with all-day events starting at midnight in `tz`.
    pub fn start_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        match &self.span {
            EventSpan::Timed { start, .. } => Some(start.with_timezone(tz)),
            EventSpan::AllDay { start, .. } => tz
                .from_local_datetime(&start.and_hms_opt(0, 0, 0)?)
                .earliest(),
        }
    }

    /// Build the event calsync writes to a destination for this source event.
    ///
    /// Attendees are dropped so destination providers never send invitations,
    /// reminders fall back to the calendar default, and the private properties
    /// hold only the tracking key.
    pub fn prepare_for_destination(&self) -> Event {
        Event {
            id: String::new(),
            summary: self.summary.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            span: self.span.clone(),
            transparency: Transparency::Opaque,
            kind: EventKind::Default,
            recurring_event_id: None,
            private_properties: BTreeMap::from([(TRACKING_KEY.to_string(), self.id.clone())]),
            reminders: Reminders::UseDefault,
            attendees: Vec::new(),
            conference: self.conference.clone(),
        }
    }

    /// Compare the fields calsync owns on a destination event.
    ///
    /// Returns the name of the first differing field, or `None` if the
    /// destination copy is up to date.
    pub fn first_difference(&self, other: &Event) -> Option<&'static str> {
        if self.summary != other.summary {
            return Some("summary");
        }
        if normalized(&self.description) != normalized(&other.description) {
            return Some("description");
        }
        if normalized(&self.location) != normalized(&other.location) {
            return Some("location");
        }
        if !self.span.same_start(&other.span) {
            return Some("start");
        }
        if !self.span.same_end(&other.span) {
            return Some("end");
        }
        if self.meeting_link() != other.meeting_link() {
            return Some("conference");
        }
        None
    }
}

/// Providers disagree on absent vs empty text fields.
fn normalized(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

impl EventSpan {
    /// Same start, comparing timed instants in UTC. All-day vs timed never matches.
    pub fn same_start(&self, other: &EventSpan) -> bool {
        match (self, other) {
            (EventSpan::AllDay { start: a, .. }, EventSpan::AllDay { start: b, .. }) => a == b,
            (EventSpan::Timed { start: a, .. }, EventSpan::Timed { start: b, .. }) => {
                a.with_timezone(&Utc) == b.with_timezone(&Utc)
            }
            _ => false,
        }
    }

    pub fn same_end(&self, other: &EventSpan) -> bool {
        match (self, other) {
            (EventSpan::AllDay { end: a, .. }, EventSpan::AllDay { end: b, .. }) => a == b,
            (EventSpan::Timed { end: a, .. }, EventSpan::Timed { end: b, .. }) => {
                a.with_timezone(&Utc) == b.with_timezone(&Utc)
            }
            _ => false,
        }
    }
}
