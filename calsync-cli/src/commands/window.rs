use std::process::ExitCode;

use anyhow::Result;
use calsync_core::config::Config;
use calsync_core::window::SyncWindow;
use chrono::Utc;
use owo_colors::OwoColorize;

use crate::WeekArgs;

pub fn run(config: &Config, weeks: WeekArgs) -> Result<ExitCode> {
    let tz = config.timezone()?;
    let (weeks_forward, weeks_back) = weeks.resolve(config);
    let window = SyncWindow::compute(Utc::now().with_timezone(&tz), weeks_forward, weeks_back)?;
    let wide = window.wide()?;

    println!("{}", "Sync window".bold());
    println!("  Source events:      {window}");
    println!("  Destination events: {}", wide.to_string().dimmed());

    Ok(ExitCode::SUCCESS)
}
