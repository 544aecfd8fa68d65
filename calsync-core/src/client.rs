//! The capability contract every destination backend implements.
//!
//! The reconciler only ever talks to a `dyn CalendarClient`; whether the
//! calendar lives behind the Google Calendar REST API or a CalDAV server is
//! the provider's business.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{SyncError, SyncResult};
use crate::event::Event;

/// Provider-specific calendar identifier, resolved at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarRef(pub String);

impl CalendarRef {
    pub fn new(id: impl Into<String>) -> Self {
        CalendarRef(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CalendarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Find a calendar by display name, creating it if missing.
    async fn resolve_or_create_calendar(
        &self,
        display_name: &str,
        color: Option<&str>,
    ) -> SyncResult<CalendarRef>;

    /// List events overlapping `[time_min, time_max]`, with recurring series
    /// expanded into instances.
    async fn list_events(
        &self,
        calendar: &CalendarRef,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> SyncResult<Vec<Event>>;

    async fn get_event(&self, calendar: &CalendarRef, event_id: &str) -> SyncResult<Event>;

    /// Insert without notifying attendees.
    async fn insert_event(&self, calendar: &CalendarRef, event: &Event) -> SyncResult<()>;

    async fn update_event(
        &self,
        calendar: &CalendarRef,
        event_id: &str,
        event: &Event,
    ) -> SyncResult<()>;

    async fn delete_event(&self, calendar: &CalendarRef, event_id: &str) -> SyncResult<()>;

    async fn find_events_by_tracking_key(
        &self,
        calendar: &CalendarRef,
        key: &str,
    ) -> SyncResult<Vec<Event>>;
}

/// Run a client call unless the pass has been cancelled.
///
/// Dropping the call future aborts it; provider subprocesses are killed on drop.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SyncError::Cancelled),
        result = call => result,
    }
}
