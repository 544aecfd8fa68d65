//! Runs the reconciler for every selected destination.

use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info_span};

use crate::client::{CalendarClient, CalendarRef};
use crate::config::{Destination, DestinationKind};
use crate::error::SyncResult;
use crate::provider::{Provider, ProviderClient};
use crate::reconcile::{ReconcileOptions, Reconciler, SyncStats};
use crate::reminder::{CredentialInspector, TokenFile};
use crate::safety::SafetyGate;
use crate::window::SyncWindow;

/// A destination with the client used to reach it.
pub struct DestinationTarget {
    pub config: Destination,
    pub client: Box<dyn CalendarClient>,
    pub credentials: Option<Box<dyn CredentialInspector>>,
}

impl DestinationTarget {
    /// Talk to the destination through its `calsync-provider-<kind>` binary.
    pub fn from_config(config: Destination, timeout: Duration) -> Self {
        let provider = Provider::from_name(config.kind.provider_name()).with_timeout(timeout);
        let client = ProviderClient::new(provider, config.provider_params());

        // Only Google tokens go stale on a schedule
        let credentials = match (config.kind, config.token_path()) {
            (DestinationKind::Google, Some(path)) => {
                Some(Box::new(TokenFile::new(path)) as Box<dyn CredentialInspector>)
            }
            _ => None,
        };

        DestinationTarget {
            config,
            client: Box::new(client),
            credentials,
        }
    }
}

#[derive(Debug)]
pub struct DestinationReport {
    pub name: String,
    pub result: SyncResult<SyncStats>,
}

/// Outcome of one run, in destination order.
#[derive(Debug, Default)]
pub struct BatchReport(pub Vec<DestinationReport>);

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &DestinationReport> {
        self.0.iter().filter(|r| r.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Stats summed over the destinations that completed.
    pub fn totals(&self) -> SyncStats {
        let mut totals = SyncStats::default();
        for stats in self.0.iter().filter_map(|r| r.result.as_ref().ok()) {
            totals += *stats;
        }
        totals
    }
}

pub struct Orchestrator<'a> {
    source: &'a dyn CalendarClient,
    source_calendar: CalendarRef,
    gate: &'a SafetyGate,
    options: ReconcileOptions,
    concurrency: usize,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn CalendarClient,
        source_calendar: CalendarRef,
        gate: &'a SafetyGate,
        options: ReconcileOptions,
    ) -> Self {
        Orchestrator {
            source,
            source_calendar,
            gate,
            options,
            concurrency: 1,
        }
    }

    /// How many destinations may sync at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sync every target. A failing destination never stops the others.
    pub async fn run(
        &self,
        targets: &[DestinationTarget],
        window: &SyncWindow,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let mut reports: Vec<(usize, DestinationReport)> = stream::iter(targets.iter().enumerate())
            .map(|(index, target)| async move {
                let span = info_span!("destination", name = %target.config.name);
                let result = self.sync_one(target, window, cancel).instrument(span).await;
                if let Err(e) = &result {
                    error!(destination = %target.config.name, "sync failed: {e}");
                }
                (
                    index,
                    DestinationReport {
                        name: target.config.name.clone(),
                        result,
                    },
                )
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        reports.sort_by_key(|(index, _)| *index);
        BatchReport(reports.into_iter().map(|(_, report)| report).collect())
    }

    async fn sync_one(
        &self,
        target: &DestinationTarget,
        window: &SyncWindow,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncStats> {
        let mut reconciler = Reconciler::new(
            self.source,
            self.source_calendar.clone(),
            target.client.as_ref(),
            &target.config,
            self.gate,
            self.options.clone(),
        );
        if let Some(credentials) = &target.credentials {
            reconciler = reconciler.with_credentials(credentials.as_ref());
        }
        reconciler.run(window, cancel).await
    }
}
