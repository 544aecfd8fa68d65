//! In-memory collaborators shared by the unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};

use crate::client::{CalendarClient, CalendarRef};
use crate::config::{Destination, DestinationKind, ProviderParams};
use crate::error::{SyncError, SyncResult};
use crate::event::{Event, EventKind, EventSpan, Reminders, TRACKING_KEY, Transparency};
use crate::safety::ConfirmationPrompt;

pub fn timed(id: &str, summary: &str, start: &str, end: &str) -> Event {
    Event {
        id: id.to_string(),
        summary: summary.to_string(),
        description: None,
        location: None,
        span: EventSpan::Timed {
            start: DateTime::parse_from_rfc3339(start).unwrap(),
            end: DateTime::parse_from_rfc3339(end).unwrap(),
        },
        transparency: Transparency::Opaque,
        kind: EventKind::Default,
        recurring_event_id: None,
        private_properties: BTreeMap::new(),
        reminders: Reminders::UseDefault,
        attendees: vec![],
        conference: None,
    }
}

pub fn all_day(id: &str, summary: &str, date: &str) -> Event {
    let start = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    let mut event = timed(id, summary, "2025-01-01T00:00:00Z", "2025-01-01T01:00:00Z");
    event.span = EventSpan::AllDay {
        start,
        end: start.succ_opt().unwrap(),
    };
    event
}

pub fn destination(name: &str) -> Destination {
    Destination {
        name: name.to_string(),
        kind: DestinationKind::Google,
        calendar_name: "Work Sync".to_string(),
        calendar_color: "7".to_string(),
        token_path: Some("/tmp/calsync-test-token.json".into()),
        server_url: None,
        username: None,
        password: None,
        params: ProviderParams::default(),
    }
}

/// Mark a destination event as synced from source event `key`.
pub fn tagged(mut event: Event, key: &str) -> Event {
    event
        .private_properties
        .insert(TRACKING_KEY.to_string(), key.to_string());
    event
}

/// A mutation observed by [`MemoryCalendar`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    Insert(String),
    Update(String),
    Delete(String),
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    calls: Vec<Call>,
    gets: Vec<String>,
    next_id: usize,
}

/// A single calendar held in memory, with optional failure injection.
#[derive(Default)]
pub struct MemoryCalendar {
    state: Mutex<State>,
    fail_list: bool,
    fail_get: bool,
    fail_ids: HashSet<String>,
    second_precision: bool,
}

impl MemoryCalendar {
    pub fn with_events(events: Vec<Event>) -> Self {
        let calendar = MemoryCalendar::default();
        calendar.state.lock().unwrap().events = events;
        calendar
    }

    pub fn failing_list() -> Self {
        MemoryCalendar {
            fail_list: true,
            ..Default::default()
        }
    }

    pub fn fail_get(mut self) -> Self {
        self.fail_get = true;
        self
    }

    /// Mutations against `id` fail.
    pub fn fail_on(mut self, id: &str) -> Self {
        self.fail_ids.insert(id.to_string());
        self
    }

    /// Store times truncated to whole seconds, as RFC3339 backends do.
    pub fn second_precision(mut self) -> Self {
        self.second_precision = true;
        self
    }

    fn stored(&self, event: &Event, id: String) -> Event {
        let mut stored = Event {
            id,
            ..event.clone()
        };
        if let (true, EventSpan::Timed { start, end }) = (self.second_precision, &mut stored.span) {
            *start = start.trunc_subsecs(0);
            *end = end.trunc_subsecs(0);
        }
        stored
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn set_events(&self, events: Vec<Event>) {
        self.state.lock().unwrap().events = events;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn gets(&self) -> Vec<String> {
        self.state.lock().unwrap().gets.clone()
    }

    pub fn events_tagged(&self, key: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.tracking_key() == Some(key))
            .collect()
    }

    fn check(&self, id: &str) -> SyncResult<()> {
        if self.fail_ids.contains(id) {
            return Err(SyncError::Provider(format!("injected failure for {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarClient for MemoryCalendar {
    async fn resolve_or_create_calendar(
        &self,
        display_name: &str,
        _color: Option<&str>,
    ) -> SyncResult<CalendarRef> {
        Ok(CalendarRef::new(display_name))
    }

    async fn list_events(
        &self,
        _calendar: &CalendarRef,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> SyncResult<Vec<Event>> {
        if self.fail_list {
            return Err(SyncError::Provider("listing is broken".into()));
        }
        Ok(self.events())
    }

    async fn get_event(&self, _calendar: &CalendarRef, event_id: &str) -> SyncResult<Event> {
        let mut state = self.state.lock().unwrap();
        state.gets.push(event_id.to_string());
        if self.fail_get {
            return Err(SyncError::Provider("lookup is broken".into()));
        }
        state
            .events
            .iter()
            .find(|e| e.id == event_id)
            .cloned()
            .ok_or_else(|| SyncError::Provider(format!("no event {event_id}")))
    }

    async fn insert_event(&self, _calendar: &CalendarRef, event: &Event) -> SyncResult<()> {
        let key = event.tracking_key().unwrap_or_default().to_string();
        self.check(&key)?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let stored = self.stored(event, format!("dest-{}", state.next_id));
        state.events.push(stored);
        state.calls.push(Call::Insert(key));
        Ok(())
    }

    async fn update_event(
        &self,
        _calendar: &CalendarRef,
        event_id: &str,
        event: &Event,
    ) -> SyncResult<()> {
        self.check(event_id)?;
        let stored = self.stored(event, event_id.to_string());
        let mut state = self.state.lock().unwrap();
        let slot = state
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| SyncError::Provider(format!("no event {event_id}")))?;
        *slot = stored;
        state.calls.push(Call::Update(event_id.to_string()));
        Ok(())
    }

    async fn delete_event(&self, _calendar: &CalendarRef, event_id: &str) -> SyncResult<()> {
        self.check(event_id)?;
        let mut state = self.state.lock().unwrap();
        state.events.retain(|e| e.id != event_id);
        state.calls.push(Call::Delete(event_id.to_string()));
        Ok(())
    }

    async fn find_events_by_tracking_key(
        &self,
        _calendar: &CalendarRef,
        key: &str,
    ) -> SyncResult<Vec<Event>> {
        Ok(self.events_tagged(key))
    }
}

/// A prompt with a canned answer.
pub struct ScriptedPrompt {
    pub interactive: bool,
    pub answer: Option<String>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn unattended() -> Self {
        ScriptedPrompt {
            interactive: false,
            answer: None,
            asked: Mutex::new(vec![]),
        }
    }

    pub fn answering(answer: Option<&str>) -> Self {
        ScriptedPrompt {
            interactive: true,
            answer: answer.map(str::to_string),
            asked: Mutex::new(vec![]),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.lock().unwrap().len()
    }
}

#[async_trait]
impl ConfirmationPrompt for ScriptedPrompt {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    async fn ask(&self, message: &str) -> Option<String> {
        self.asked.lock().unwrap().push(message.to_string());
        self.answer.clone()
    }
}
