//! JSON protocol spoken with provider binaries over stdin/stdout.
//!
//! calsync writes one [`Request`] line to the provider's stdin and reads one
//! [`Response`] from its stdout. Every request carries the destination's
//! provider parameters (token path, CalDAV credentials, ...) flattened into
//! `params`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::event::Event;

pub trait ProviderCommand: Serialize {
    type Response: DeserializeOwned;
    fn command() -> Command;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    ResolveCalendar,
    ListEvents,
    GetEvent,
    InsertEvent,
    UpdateEvent,
    DeleteEvent,
    FindEventsByTrackingKey,
}

/// Request sent from calsync to a provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response sent from a provider to calsync.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Success { data: T },
    Error { error: String },
}

type Params = serde_json::Map<String, serde_json::Value>;

/// Find a calendar by display name, creating it if needed. Returns its id.
#[derive(Debug, Serialize)]
pub struct ResolveCalendar<'a> {
    #[serde(flatten)]
    pub params: &'a Params,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'a str>,
}

impl ProviderCommand for ResolveCalendar<'_> {
    type Response = String;
    fn command() -> Command {
        Command::ResolveCalendar
    }
}

/// List expanded event instances overlapping a time range.
///
/// Events come back as raw JSON so one malformed entry does not fail the batch.
#[derive(Debug, Serialize)]
pub struct ListEvents<'a> {
    #[serde(flatten)]
    pub params: &'a Params,
    pub calendar_id: &'a str,
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
}

impl ProviderCommand for ListEvents<'_> {
    type Response = Vec<serde_json::Value>;
    fn command() -> Command {
        Command::ListEvents
    }
}

#[derive(Debug, Serialize)]
pub struct GetEvent<'a> {
    #[serde(flatten)]
    pub params: &'a Params,
    pub calendar_id: &'a str,
    pub event_id: &'a str,
}

impl ProviderCommand for GetEvent<'_> {
    type Response = Event;
    fn command() -> Command {
        Command::GetEvent
    }
}

#[derive(Debug, Serialize)]
pub struct InsertEvent<'a> {
    #[serde(flatten)]
    pub params: &'a Params,
    pub calendar_id: &'a str,
    pub event: &'a Event,
    /// Always false: attendees must never be notified about mirrored events.
    pub send_notifications: bool,
}

impl ProviderCommand for InsertEvent<'_> {
    type Response = ();
    fn command() -> Command {
        Command::InsertEvent
    }
}

#[derive(Debug, Serialize)]
pub struct UpdateEvent<'a> {
    #[serde(flatten)]
    pub params: &'a Params,
    pub calendar_id: &'a str,
    pub event_id: &'a str,
    pub event: &'a Event,
}

impl ProviderCommand for UpdateEvent<'_> {
    type Response = ();
    fn command() -> Command {
        Command::UpdateEvent
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteEvent<'a> {
    #[serde(flatten)]
    pub params: &'a Params,
    pub calendar_id: &'a str,
    pub event_id: &'a str,
}

impl ProviderCommand for DeleteEvent<'_> {
    type Response = ();
    fn command() -> Command {
        Command::DeleteEvent
    }
}

/// Events whose private property `property` equals `value`, in any time range.
#[derive(Debug, Serialize)]
pub struct FindEventsByTrackingKey<'a> {
    #[serde(flatten)]
    pub params: &'a Params,
    pub calendar_id: &'a str,
    pub property: &'a str,
    pub value: &'a str,
}

impl ProviderCommand for FindEventsByTrackingKey<'_> {
    type Response = Vec<serde_json::Value>;
    fn command() -> Command {
        Command::FindEventsByTrackingKey
    }
}
