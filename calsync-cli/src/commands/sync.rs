use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use calsync_core::client::CalendarRef;
use calsync_core::config::Config;
use calsync_core::orchestrator::{DestinationTarget, Orchestrator};
use calsync_core::provider::{Provider, ProviderClient};
use calsync_core::reconcile::{ReconcileOptions, Verbosity};
use calsync_core::safety::SafetyGate;
use calsync_core::window::SyncWindow;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::WeekArgs;
use crate::prompt::TerminalPrompt;
use crate::render::Render;

pub async fn run(
    config: &Config,
    destination: Option<&str>,
    weeks: WeekArgs,
    verbose: bool,
) -> Result<ExitCode> {
    let tz = config.timezone()?;
    let (weeks_forward, weeks_back) = weeks.resolve(config);
    let window = SyncWindow::compute(Utc::now().with_timezone(&tz), weeks_forward, weeks_back)?;
    let timeout = Duration::from_secs(config.provider_timeout_secs);

    // Everything that can be checked locally fails before any provider is called
    let source_provider = Provider::from_name(&config.source.provider).with_timeout(timeout);
    source_provider.ensure_installed()?;
    let source = ProviderClient::new(source_provider, config.source.provider_params());

    let targets: Vec<DestinationTarget> = config
        .select(destination)?
        .into_iter()
        .map(|dest| DestinationTarget::from_config(dest.clone(), timeout))
        .collect();
    for target in &targets {
        Provider::from_name(target.config.kind.provider_name()).ensure_installed()?;
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping sync");
                cancel.cancel();
            }
        }
    });

    let gate = SafetyGate::new(Arc::new(TerminalPrompt));
    let options = ReconcileOptions {
        verbosity: if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        },
    };

    info!(%window, destinations = targets.len(), "starting sync");
    let report = Orchestrator::new(
        &source,
        CalendarRef::new(config.source.calendar_id.as_str()),
        &gate,
        options,
    )
    .with_concurrency(config.concurrency)
    .run(&targets, &window, &cancel)
    .await;

    println!("{}", report.render());

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
