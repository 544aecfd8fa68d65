//! One-way reconciliation of a destination calendar against the source.
//!
//! Every pass fetches both sides fresh. Destination events remember which
//! source event they mirror through the tracking key in their private
//! properties; no other state is kept between passes.

mod mutation;

pub use mutation::{MutationKind, SyncStats};

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{CalendarClient, CalendarRef, cancellable};
use crate::config::Destination;
use crate::error::{SyncError, SyncResult};
use crate::event::{Event, TOKEN_REMINDER_KEY};
use crate::filter::EventFilter;
use crate::reminder::{CredentialInspector, plan_reminder, upsert_reminder};
use crate::safety::SafetyGate;
use crate::window::SyncWindow;
use mutation::Mutation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    #[default]
    Normal,
    /// Also log unchanged matches and which field made an event differ.
    Verbose,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    pub verbosity: Verbosity,
}

/// Mirrors the source calendar into one destination.
pub struct Reconciler<'a> {
    source: &'a dyn CalendarClient,
    source_calendar: CalendarRef,
    destination: &'a dyn CalendarClient,
    target: &'a Destination,
    gate: &'a SafetyGate,
    options: ReconcileOptions,
    credentials: Option<&'a dyn CredentialInspector>,
}

/// State for a single pass.
struct Pass<'p> {
    calendar: CalendarRef,
    window: &'p SyncWindow,
    cancel: &'p CancellationToken,
    stats: SyncStats,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        source: &'a dyn CalendarClient,
        source_calendar: CalendarRef,
        destination: &'a dyn CalendarClient,
        target: &'a Destination,
        gate: &'a SafetyGate,
        options: ReconcileOptions,
    ) -> Self {
        Reconciler {
            source,
            source_calendar,
            destination,
            target,
            gate,
            options,
            credentials: None,
        }
    }

    /// Keep a token-expiry reminder in the destination calendar.
    pub fn with_credentials(mut self, inspector: &'a dyn CredentialInspector) -> Self {
        self.credentials = Some(inspector);
        self
    }

    /// Run one pass over `window`.
    ///
    /// Fails only if a fetch fails, the safety gate refuses, or the pass is
    /// cancelled. Individual writes that fail are logged and counted.
    pub async fn run(
        &self,
        window: &SyncWindow,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncStats> {
        let calendar = cancellable(
            cancel,
            self.destination.resolve_or_create_calendar(
                &self.target.calendar_name,
                Some(&self.target.calendar_color),
            ),
        )
        .await
        .map_err(|e| SyncError::fetch(format!("calendar '{}'", self.target.calendar_name), e))?;
        debug!(%calendar, "resolved destination calendar");

        let mut pass = Pass {
            calendar,
            window,
            cancel,
            stats: SyncStats::default(),
        };

        let source_events = self.fetch_source(&pass).await?;
        let (groups, untagged) = partition(self.fetch_destination(&pass).await?);

        let mut order = Vec::with_capacity(source_events.len());
        let mut pending: HashMap<String, Event> = HashMap::with_capacity(source_events.len());
        for event in source_events {
            if event.id.is_empty() {
                warn!(summary = %event.summary, "skipping source event without an id");
                continue;
            }
            let id = event.id.clone();
            if pending.insert(id.clone(), event).is_none() {
                order.push(id);
            }
        }

        self.gate
            .check(&self.target.calendar_name, untagged.len())
            .await?;
        for event in &untagged {
            debug!(id = %event.id, summary = %event.summary, "deleting event not created by calsync");
            self.apply(&mut pass, Mutation::Delete(event)).await?;
        }

        for (key, group) in groups {
            let source = pending.remove(&key);
            self.resolve(&mut pass, &key, source.as_ref(), group).await?;
        }

        for id in order {
            if let Some(source) = pending.remove(&id) {
                self.resolve(&mut pass, &id, Some(&source), Vec::new())
                    .await?;
            }
        }

        if let Some(inspector) = self.credentials {
            self.refresh_reminder(&pass, inspector).await?;
        }

        info!(stats = %pass.stats, "reconciled");
        Ok(pass.stats)
    }

    async fn fetch_source(&self, pass: &Pass<'_>) -> SyncResult<Vec<Event>> {
        let (time_min, time_max) = pass.window.utc_bounds();
        let events = cancellable(
            pass.cancel,
            self.source
                .list_events(&self.source_calendar, time_min, time_max),
        )
        .await
        .map_err(|e| SyncError::fetch("source events", e))?;

        let fetched = events.len();
        let kept = EventFilter::new(self.source, &self.source_calendar, pass.window.timezone())
            .apply(events, pass.cancel)
            .await?;
        info!(window = %pass.window, fetched, kept = kept.len(), "fetched source events");
        Ok(kept)
    }

    async fn fetch_destination(&self, pass: &Pass<'_>) -> SyncResult<Vec<Event>> {
        let (time_min, time_max) = pass.window.wide()?.utc_bounds();
        let events = cancellable(
            pass.cancel,
            self.destination
                .list_events(&pass.calendar, time_min, time_max),
        )
        .await
        .map_err(|e| {
            SyncError::fetch(format!("events from '{}'", self.target.calendar_name), e)
        })?;
        debug!(count = events.len(), "fetched destination events");
        Ok(events)
    }

    /// Bring the destination events tracked under `key` in line with `source`.
    ///
    /// With no source event every member is stale. Otherwise one member is
    /// kept (updated if it differs), the rest are duplicates, and an empty
    /// group gets a fresh copy.
    async fn resolve(
        &self,
        pass: &mut Pass<'_>,
        key: &str,
        source: Option<&Event>,
        mut group: Vec<Event>,
    ) -> SyncResult<()> {
        let Some(source) = source else {
            for stale in &group {
                debug!(key, id = %stale.id, "source event gone or filtered out");
                self.apply(pass, Mutation::Delete(stale)).await?;
            }
            return Ok(());
        };

        let prepared = source.prepare_for_destination();
        if group.is_empty() {
            return self.apply(pass, Mutation::Create(&prepared)).await;
        }

        let current = group.remove(representative(&group, pass.window));
        for duplicate in &group {
            debug!(key, id = %duplicate.id, kept = %current.id, "removing duplicate");
            self.apply(pass, Mutation::Delete(duplicate)).await?;
        }

        match current.first_difference(&prepared) {
            None => {
                pass.stats.unchanged += 1;
                if self.options.verbosity == Verbosity::Verbose {
                    info!(key, summary = %current.summary, "up to date");
                }
                Ok(())
            }
            Some(field) => {
                if self.options.verbosity == Verbosity::Verbose {
                    info!(key, summary = %current.summary, field, "changed in source");
                }
                self.apply(
                    pass,
                    Mutation::Update {
                        id: &current.id,
                        event: &prepared,
                    },
                )
                .await
            }
        }
    }

    /// Perform one write. Only cancellation is returned as an error.
    async fn apply(&self, pass: &mut Pass<'_>, mutation: Mutation<'_>) -> SyncResult<()> {
        let calendar = &pass.calendar;
        let call = match &mutation {
            Mutation::Create(event) => self.destination.insert_event(calendar, event),
            Mutation::Update { id, event } => self.destination.update_event(calendar, id, event),
            Mutation::Delete(event) => self.destination.delete_event(calendar, &event.id),
        };

        match cancellable(pass.cancel, call).await {
            Ok(()) => {
                info!("{mutation}");
                pass.stats.record(mutation.kind());
                Ok(())
            }
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(e) => {
                warn!(id = %mutation.event().id, "{mutation} failed: {e}");
                pass.stats.failed += 1;
                Ok(())
            }
        }
    }

    async fn refresh_reminder(
        &self,
        pass: &Pass<'_>,
        inspector: &dyn CredentialInspector,
    ) -> SyncResult<()> {
        match self.write_reminder(pass, inspector).await {
            Ok(Some(kind)) => info!("{kind} token refresh reminder"),
            Ok(None) => {}
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => warn!("could not update token refresh reminder: {e}"),
        }
        Ok(())
    }

    async fn write_reminder(
        &self,
        pass: &Pass<'_>,
        inspector: &dyn CredentialInspector,
    ) -> SyncResult<Option<MutationKind>> {
        let Some(last_refreshed) = inspector.last_refreshed()? else {
            debug!("no token file; skipping reminder");
            return Ok(None);
        };
        let Some(plan) = plan_reminder(Utc::now(), last_refreshed) else {
            return Ok(None);
        };

        let reminder = plan.to_event(&self.target.name);
        upsert_reminder(self.destination, &pass.calendar, &reminder, pass.cancel).await
    }
}

/// Split destination events into tracked groups and untagged events.
///
/// The token reminder belongs to neither.
fn partition(events: Vec<Event>) -> (BTreeMap<String, Vec<Event>>, Vec<Event>) {
    let mut groups: BTreeMap<String, Vec<Event>> = BTreeMap::new();
    let mut untagged = Vec::new();

    for event in events {
        match event.tracking_key() {
            Some(TOKEN_REMINDER_KEY) => {}
            Some(key) => groups.entry(key.to_string()).or_default().push(event),
            None => untagged.push(event),
        }
    }

    (groups, untagged)
}

/// Index of the group member to keep: the first starting inside the sync
/// window, else the first one listed.
fn representative(group: &[Event], window: &SyncWindow) -> usize {
    let tz = window.timezone();
    group
        .iter()
        .position(|event| {
            event
                .start_in(&tz)
                .is_some_and(|start| window.contains(&start))
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{DateTime, TimeDelta, TimeZone, Timelike};
    use chrono_tz::Europe::Berlin;

    use crate::event::EventSpan;
    use crate::testing::{Call, MemoryCalendar, ScriptedPrompt, all_day, destination, tagged, timed};

    fn window() -> SyncWindow {
        // Wednesday; window is Mon 2025-03-17 to Sun 2025-03-30
        SyncWindow::compute(Berlin.with_ymd_and_hms(2025, 3, 19, 12, 0, 0).unwrap(), 2, 0).unwrap()
    }

    fn standup(id: &str) -> Event {
        timed(id, "Standup", "2025-03-20T10:00:00+01:00", "2025-03-20T11:00:00+01:00")
    }

    struct Harness {
        source: MemoryCalendar,
        dest: MemoryCalendar,
        target: Destination,
        gate: SafetyGate,
    }

    impl Harness {
        fn new(source: Vec<Event>, dest: Vec<Event>) -> Self {
            Self::with(
                MemoryCalendar::with_events(source),
                MemoryCalendar::with_events(dest),
                ScriptedPrompt::unattended(),
            )
        }

        fn with(source: MemoryCalendar, dest: MemoryCalendar, prompt: ScriptedPrompt) -> Self {
            Harness {
                source,
                dest,
                target: destination("Personal"),
                gate: SafetyGate::new(Arc::new(prompt)),
            }
        }

        fn reconciler(&self) -> Reconciler<'_> {
            Reconciler::new(
                &self.source,
                CalendarRef::new("primary"),
                &self.dest,
                &self.target,
                &self.gate,
                ReconcileOptions::default(),
            )
        }

        async fn run(&self) -> SyncResult<SyncStats> {
            self.reconciler()
                .run(&window(), &CancellationToken::new())
                .await
        }
    }

    #[tokio::test]
    async fn test_new_source_event_is_inserted_with_tracking_key() {
        let h = Harness::new(vec![standup("E1")], vec![]);

        let stats = h.run().await.unwrap();

        assert_eq!(stats.created, 1);
        assert_eq!(h.dest.calls(), vec![Call::Insert("E1".to_string())]);
        let copies = h.dest.events_tagged("E1");
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].summary, "Standup");
        assert!(copies[0].attendees.is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let h = Harness::new(
            vec![standup("A"), all_day("B", "Conference", "2025-03-25")],
            vec![],
        );
        h.run().await.unwrap();
        h.dest.clear_calls();

        let stats = h.run().await.unwrap();

        assert!(h.dest.calls().is_empty());
        assert_eq!(stats.mutations(), 0);
        assert_eq!(stats.unchanged, 2);
    }

    #[tokio::test]
    async fn test_changed_start_updates_in_place() {
        let synced = tagged(standup("d1"), "A");
        let moved = timed("A", "Standup", "2025-03-20T11:00:00+01:00", "2025-03-20T12:00:00+01:00");
        let h = Harness::new(vec![moved], vec![synced]);

        let stats = h.run().await.unwrap();

        assert_eq!(h.dest.calls(), vec![Call::Update("d1".to_string())]);
        assert_eq!(stats.updated, 1);
        let copy = &h.dest.events_tagged("A")[0];
        assert!(copy.span.same_start(&EventSpan::Timed {
            start: DateTime::parse_from_rfc3339("2025-03-20T10:00:00Z").unwrap(),
            end: DateTime::parse_from_rfc3339("2025-03-20T11:00:00Z").unwrap(),
        }));
    }

    #[tokio::test]
    async fn test_removed_source_event_is_deleted() {
        let h = Harness::new(vec![], vec![tagged(standup("d1"), "K")]);

        let stats = h.run().await.unwrap();

        assert_eq!(h.dest.calls(), vec![Call::Delete("d1".to_string())]);
        assert_eq!(stats.deleted, 1);
    }

    #[tokio::test]
    async fn test_filtered_out_source_event_is_deleted_from_destination() {
        let early = |id| timed(id, "Gym", "2025-03-20T05:00:00+01:00", "2025-03-20T05:30:00+01:00");
        let h = Harness::new(vec![early("A")], vec![tagged(early("d1"), "A")]);

        h.run().await.unwrap();

        assert_eq!(h.dest.calls(), vec![Call::Delete("d1".to_string())]);
    }

    #[tokio::test]
    async fn test_duplicates_collapse_to_the_copy_inside_the_window() {
        let outside = tagged(
            timed("d1", "Standup", "2025-01-09T10:00:00+01:00", "2025-01-09T11:00:00+01:00"),
            "A",
        );
        let inside = tagged(standup("d2"), "A");
        let h = Harness::new(vec![standup("A")], vec![outside, inside]);

        h.run().await.unwrap();

        assert_eq!(h.dest.calls(), vec![Call::Delete("d1".to_string())]);
        let copies = h.dest.events_tagged("A");
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].id, "d2");
    }

    #[tokio::test]
    async fn test_duplicates_outside_window_keep_first_and_update_it() {
        let first = tagged(
            timed("d1", "Standup", "2025-01-09T10:00:00+01:00", "2025-01-09T11:00:00+01:00"),
            "A",
        );
        let second = tagged(
            timed("d2", "Standup", "2025-01-10T10:00:00+01:00", "2025-01-10T11:00:00+01:00"),
            "A",
        );
        let h = Harness::new(vec![standup("A")], vec![first, second]);

        h.run().await.unwrap();

        let calls = h.dest.calls();
        assert!(calls.contains(&Call::Delete("d2".to_string())));
        assert!(calls.contains(&Call::Update("d1".to_string())));
        assert_eq!(calls.len(), 2);
        assert_eq!(h.dest.events_tagged("A").len(), 1);
    }

    #[tokio::test]
    async fn test_untagged_event_blocks_unattended_run() {
        let manual = standup("manual");
        let h = Harness::new(vec![standup("A")], vec![manual]);

        let result = h.run().await;

        assert!(matches!(
            result,
            Err(SyncError::DeletionUnattended { count: 1, .. })
        ));
        assert!(h.dest.calls().is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_untagged_event_is_deleted_once() {
        let h = Harness::with(
            MemoryCalendar::default(),
            MemoryCalendar::with_events(vec![standup("manual")]),
            ScriptedPrompt::answering(Some("yes")),
        );

        h.run().await.unwrap();

        assert_eq!(h.dest.calls(), vec![Call::Delete("manual".to_string())]);
    }

    #[tokio::test]
    async fn test_refused_confirmation_touches_nothing() {
        let h = Harness::with(
            MemoryCalendar::with_events(vec![standup("A")]),
            MemoryCalendar::with_events(vec![standup("manual")]),
            ScriptedPrompt::answering(Some("no")),
        );

        let result = h.run().await;

        assert!(matches!(result, Err(SyncError::DeletionRefused { .. })));
        assert!(h.dest.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_update_delete_lifecycle() {
        let h = Harness::new(vec![standup("A")], vec![]);

        h.run().await.unwrap();
        let copies = h.dest.events_tagged("A");
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].summary, "Standup");

        h.source.set_events(vec![timed(
            "A",
            "Standup",
            "2025-03-20T11:00:00+01:00",
            "2025-03-20T12:00:00+01:00",
        )]);
        h.run().await.unwrap();
        let copies = h.dest.events_tagged("A");
        assert_eq!(copies.len(), 1);
        let EventSpan::Timed { start, end } = copies[0].span else {
            panic!("expected a timed event");
        };
        assert_eq!(start.with_timezone(&Berlin).format("%H:%M").to_string(), "11:00");
        assert_eq!(end.with_timezone(&Berlin).format("%H:%M").to_string(), "12:00");

        h.source.set_events(vec![]);
        h.run().await.unwrap();
        assert!(h.dest.events().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_the_pass() {
        let h = Harness::with(
            MemoryCalendar::with_events(vec![
                standup("A"),
                timed("B", "Review", "2025-03-21T14:00:00+01:00", "2025-03-21T15:00:00+01:00"),
                timed("C", "Retro", "2025-03-21T16:00:00+01:00", "2025-03-21T17:00:00+01:00"),
            ]),
            MemoryCalendar::default().fail_on("B"),
            ScriptedPrompt::unattended(),
        );

        let stats = h.run().await.unwrap();

        assert_eq!(stats.created, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(h.dest.events_tagged("A").len(), 1);
        assert_eq!(h.dest.events_tagged("C").len(), 1);
        assert!(h.dest.events_tagged("B").is_empty());
    }

    #[tokio::test]
    async fn test_token_reminder_is_never_stale() {
        let reminder = tagged(standup("r1"), TOKEN_REMINDER_KEY);
        let h = Harness::new(vec![], vec![reminder]);

        h.run().await.unwrap();

        assert!(h.dest.calls().is_empty());
        assert_eq!(h.dest.events().len(), 1);
    }

    #[tokio::test]
    async fn test_source_fetch_failure_aborts_before_writing() {
        let h = Harness::with(
            MemoryCalendar::failing_list(),
            MemoryCalendar::with_events(vec![tagged(standup("d1"), "A")]),
            ScriptedPrompt::unattended(),
        );

        let result = h.run().await;

        assert!(matches!(result, Err(SyncError::Fetch { .. })));
        assert!(h.dest.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_pass_writes_nothing() {
        let h = Harness::new(vec![standup("A")], vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = h.reconciler().run(&window(), &cancel).await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(h.dest.calls().is_empty());
    }

    struct RefreshedAt(Option<DateTime<Utc>>);

    impl CredentialInspector for RefreshedAt {
        fn last_refreshed(&self) -> SyncResult<Option<DateTime<Utc>>> {
            Ok(self.0)
        }
    }

    struct Unreadable;

    impl CredentialInspector for Unreadable {
        fn last_refreshed(&self) -> SyncResult<Option<DateTime<Utc>>> {
            Err(SyncError::Io(std::io::Error::other("permission denied")))
        }
    }

    #[tokio::test]
    async fn test_reminder_written_alongside_events() {
        let h = Harness::new(vec![standup("A")], vec![]);
        let token = RefreshedAt(Some(Utc::now() - TimeDelta::days(1)));

        let stats = h
            .reconciler()
            .with_credentials(&token)
            .run(&window(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.created, 1);
        assert_eq!(h.dest.events_tagged(TOKEN_REMINDER_KEY).len(), 1);
        assert_eq!(h.dest.events_tagged("A").len(), 1);
    }

    #[tokio::test]
    async fn test_reminder_from_subsecond_mtime_is_written_once() {
        let h = Harness::with(
            MemoryCalendar::with_events(vec![standup("A")]),
            MemoryCalendar::default().second_precision(),
            ScriptedPrompt::unattended(),
        );
        let mtime = (Utc::now() - TimeDelta::days(1))
            .with_nanosecond(123_456_789)
            .unwrap();
        let token = RefreshedAt(Some(mtime));

        h.reconciler()
            .with_credentials(&token)
            .run(&window(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(h.dest.events_tagged(TOKEN_REMINDER_KEY).len(), 1);
        h.dest.clear_calls();

        let stats = h
            .reconciler()
            .with_credentials(&token)
            .run(&window(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(h.dest.calls().is_empty());
        assert_eq!(stats.mutations(), 0);
    }

    #[tokio::test]
    async fn test_source_event_without_id_is_skipped() {
        let mut anonymous = standup("");
        anonymous.summary = "Anonymous".to_string();
        let h = Harness::new(vec![anonymous, standup("A")], vec![]);

        let stats = h.run().await.unwrap();

        assert_eq!(stats.created, 1);
        assert_eq!(h.dest.calls(), vec![Call::Insert("A".to_string())]);
        assert!(h.dest.events().iter().all(|e| e.tracking_key().is_some()));
    }

    #[tokio::test]
    async fn test_reminder_failure_is_not_fatal() {
        let h = Harness::new(vec![standup("A")], vec![]);

        let stats = h
            .reconciler()
            .with_credentials(&Unreadable)
            .run(&window(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.created, 1);
        assert!(h.dest.events_tagged(TOKEN_REMINDER_KEY).is_empty());
    }

    #[test]
    fn test_partition() {
        let (groups, untagged) = partition(vec![
            tagged(standup("d1"), "A"),
            standup("manual"),
            tagged(standup("d2"), "A"),
            tagged(standup("r"), TOKEN_REMINDER_KEY),
            tagged(standup("d3"), "B"),
        ]);

        assert_eq!(groups["A"].len(), 2);
        assert_eq!(groups["B"].len(), 1);
        assert_eq!(groups.len(), 2);
        assert_eq!(untagged.len(), 1);
        assert_eq!(untagged[0].id, "manual");
    }
}
