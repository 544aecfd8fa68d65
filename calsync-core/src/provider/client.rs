use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::client::{CalendarClient, CalendarRef};
use crate::error::SyncResult;
use crate::event::{Event, TRACKING_KEY};
use crate::provider::Provider;
use crate::provider::protocol::{
    DeleteEvent, FindEventsByTrackingKey, GetEvent, InsertEvent, ListEvents, ResolveCalendar,
    UpdateEvent,
};

/// A [`CalendarClient`] backed by a provider binary.
#[derive(Clone, Debug)]
pub struct ProviderClient {
    provider: Provider,
    params: serde_json::Map<String, serde_json::Value>,
}

impl ProviderClient {
    pub fn new(provider: Provider, params: serde_json::Map<String, serde_json::Value>) -> Self {
        ProviderClient { provider, params }
    }
}

#[async_trait]
impl CalendarClient for ProviderClient {
    async fn resolve_or_create_calendar(
        &self,
        display_name: &str,
        color: Option<&str>,
    ) -> SyncResult<CalendarRef> {
        let id = self
            .provider
            .call(ResolveCalendar {
                params: &self.params,
                name: display_name,
                color,
            })
            .await?;
        Ok(CalendarRef::new(id))
    }

    async fn list_events(
        &self,
        calendar: &CalendarRef,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> SyncResult<Vec<Event>> {
        let raw = self
            .provider
            .call(ListEvents {
                params: &self.params,
                calendar_id: calendar.as_str(),
                time_min,
                time_max,
            })
            .await?;
        Ok(decode_events(self.provider.name(), raw))
    }

    async fn get_event(&self, calendar: &CalendarRef, event_id: &str) -> SyncResult<Event> {
        self.provider
            .call(GetEvent {
                params: &self.params,
                calendar_id: calendar.as_str(),
                event_id,
            })
            .await
    }

    async fn insert_event(&self, calendar: &CalendarRef, event: &Event) -> SyncResult<()> {
        self.provider
            .call(InsertEvent {
                params: &self.params,
                calendar_id: calendar.as_str(),
                event,
                send_notifications: false,
            })
            .await
    }

    async fn update_event(
        &self,
        calendar: &CalendarRef,
        event_id: &str,
        event: &Event,
    ) -> SyncResult<()> {
        self.provider
            .call(UpdateEvent {
                params: &self.params,
                calendar_id: calendar.as_str(),
                event_id,
                event,
            })
            .await
    }

    async fn delete_event(&self, calendar: &CalendarRef, event_id: &str) -> SyncResult<()> {
        self.provider
            .call(DeleteEvent {
                params: &self.params,
                calendar_id: calendar.as_str(),
                event_id,
            })
            .await
    }

    async fn find_events_by_tracking_key(
        &self,
        calendar: &CalendarRef,
        key: &str,
    ) -> SyncResult<Vec<Event>> {
        let raw = self
            .provider
            .call(FindEventsByTrackingKey {
                params: &self.params,
                calendar_id: calendar.as_str(),
                property: TRACKING_KEY,
                value: key,
            })
            .await?;
        Ok(decode_events(self.provider.name(), raw))
    }
}

/// Decode events one by one, dropping any the provider sent malformed.
///
/// An event without an id cannot be tracked or deleted, so it counts as malformed.
fn decode_events(provider: &str, raw: Vec<serde_json::Value>) -> Vec<Event> {
    raw.into_iter()
        .filter_map(|value| {
            let id = value
                .get("id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<no id>")
                .to_string();
            match serde_json::from_value::<Event>(value) {
                Ok(event) if event.id.is_empty() => {
                    warn!(provider, summary = %event.summary, "dropping event without an id");
                    None
                }
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(provider, id, "dropping malformed event: {e}");
                    None
                }
            }
        })
        .collect()
}
