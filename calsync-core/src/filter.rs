//! Decides which source events are worth mirroring.
//!
//! - All-day events are kept (including out-of-office), except the
//!   "working location" markers Google puts on every day.
//! - Timed out-of-office events are dropped.
//! - Timed events entirely outside 06:00-24:00 local time are dropped.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, Timelike};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{CalendarClient, CalendarRef, cancellable};
use crate::error::{SyncError, SyncResult};
use crate::event::{Event, EventKind, EventSpan, Transparency};

const MINUTES_PER_DAY: i64 = 24 * 60;
const DAY_START_MINUTES: i64 = 6 * 60;
const DAY_END_MINUTES: i64 = MINUTES_PER_DAY;

const OOF_TITLE_MARKERS: &[&str] = &["out of office", "oof"];
const OOF_KEYWORDS: &[&str] = &["out of office", "oof", "pto", "vacation", "away"];
const WORK_LOCATION_PATTERNS: &[&str] = &[
    "remote",
    "working from",
    "work from home",
    "work from office",
    "wfh",
    "wfo",
    "work location",
];

/// Why a timed event was classified as out-of-office.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OofSignal {
    EventType,
    ParentEventType,
    ParentTransparency,
    Transparency,
    Keyword,
}

impl fmt::Display for OofSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            OofSignal::EventType => "event type",
            OofSignal::ParentEventType => "recurring parent event type",
            OofSignal::ParentTransparency => "recurring parent is free",
            OofSignal::Transparency => "event is free",
            OofSignal::Keyword => "title keyword",
        };
        f.write_str(reason)
    }
}

pub struct EventFilter<'a> {
    source: &'a dyn CalendarClient,
    calendar: &'a CalendarRef,
    tz: Tz,
}

impl<'a> EventFilter<'a> {
    /// `source` and `calendar` are used only to look up recurring parents.
    pub fn new(source: &'a dyn CalendarClient, calendar: &'a CalendarRef, tz: Tz) -> Self {
        EventFilter {
            source,
            calendar,
            tz,
        }
    }

    /// Keep the in-scope events, preserving order.
    ///
    /// Only fails if the pass is cancelled during a parent lookup.
    pub async fn apply(
        &self,
        events: Vec<Event>,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<Event>> {
        let mut parents: HashMap<String, Option<Event>> = HashMap::new();
        let mut kept = Vec::with_capacity(events.len());

        for event in events {
            match &event.span {
                EventSpan::AllDay { .. } => {
                    if is_work_location(&event) {
                        debug!(id = %event.id, summary = %event.summary, "skipping work location marker");
                        continue;
                    }
                    kept.push(event);
                }
                EventSpan::Timed { start, end } => {
                    let parent = match &event.recurring_event_id {
                        Some(parent_id) if event.kind != EventKind::OutOfOffice => {
                            self.parent(parent_id, &mut parents, cancel).await?
                        }
                        _ => None,
                    };

                    if let Some(signal) = oof_signal(&event, parent) {
                        debug!(id = %event.id, summary = %event.summary, %signal, "skipping timed out-of-office event");
                        continue;
                    }

                    if !overlaps_waking_hours(start, end, &self.tz) {
                        debug!(id = %event.id, summary = %event.summary, "skipping event outside 06:00-24:00");
                        continue;
                    }

                    kept.push(event);
                }
            }
        }

        Ok(kept)
    }

    /// Fetch a recurring parent once per pass. Lookup failures are remembered as unknown.
    async fn parent<'p>(
        &self,
        parent_id: &str,
        cache: &'p mut HashMap<String, Option<Event>>,
        cancel: &CancellationToken,
    ) -> SyncResult<Option<&'p Event>> {
        if !cache.contains_key(parent_id) {
            let lookup = cancellable(cancel, self.source.get_event(self.calendar, parent_id)).await;
            let parent = match lookup {
                Ok(parent) => Some(parent),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    warn!(parent_id, "could not fetch recurring parent: {e}");
                    None
                }
            };
            cache.insert(parent_id.to_string(), parent);
        }
        Ok(cache.get(parent_id).and_then(Option::as_ref))
    }
}

/// All-day events that only say where someone works that day.
pub fn is_work_location(event: &Event) -> bool {
    if !event.is_all_day() {
        return false;
    }

    let summary = event.summary.to_lowercase();
    if OOF_TITLE_MARKERS.iter().any(|m| summary.contains(m)) {
        return false;
    }
    if event.kind == EventKind::WorkingLocation {
        return true;
    }
    if summary.is_empty() {
        return false;
    }

    if summary.contains("office") && !summary.contains("out of") {
        return true;
    }
    WORK_LOCATION_PATTERNS.iter().any(|p| summary.contains(p))
}

/// First positive out-of-office signal, checked from most to least reliable.
pub fn oof_signal(event: &Event, parent: Option<&Event>) -> Option<OofSignal> {
    if event.kind == EventKind::OutOfOffice {
        return Some(OofSignal::EventType);
    }
    if let Some(parent) = parent {
        if parent.kind == EventKind::OutOfOffice {
            return Some(OofSignal::ParentEventType);
        }
        if parent.transparency == Transparency::Transparent {
            return Some(OofSignal::ParentTransparency);
        }
    }
    if event.transparency == Transparency::Transparent {
        return Some(OofSignal::Transparency);
    }

    let summary = event.summary.to_lowercase();
    OOF_KEYWORDS
        .iter()
        .any(|k| summary.contains(k))
        .then_some(OofSignal::Keyword)
}

/// Whether a timed event touches 06:00-24:00 on the day it starts.
///
/// End minutes are counted from the start day's midnight, so an event
/// running past midnight ends at or after 24:00.
pub fn overlaps_waking_hours(
    start: &DateTime<FixedOffset>,
    end: &DateTime<FixedOffset>,
    tz: &Tz,
) -> bool {
    let start = start.with_timezone(tz);
    let end = end.with_timezone(tz);

    let start_minutes = minutes_since_midnight(start.hour(), start.minute());
    let day_offset = (end.date_naive() - start.date_naive()).num_days();
    let end_minutes = day_offset * MINUTES_PER_DAY + minutes_since_midnight(end.hour(), end.minute());

    let starts_inside = (DAY_START_MINUTES..DAY_END_MINUTES).contains(&start_minutes);
    let ends_inside = end_minutes > DAY_START_MINUTES && end_minutes <= DAY_END_MINUTES;
    let spans_window = start_minutes < DAY_START_MINUTES && end_minutes >= DAY_END_MINUTES;

    starts_inside || ends_inside || spans_window
}

fn minutes_since_midnight(hour: u32, minute: u32) -> i64 {
    i64::from(hour * 60 + minute)
}
