use std::process::ExitCode;

use anyhow::Result;
use calsync_core::config::Config;
use calsync_core::provider::Provider;
use owo_colors::OwoColorize;

pub fn run(config: &Config) -> Result<ExitCode> {
    let source = Provider::from_name(&config.source.provider);
    println!("{}", "Source".bold());
    println!(
        "  {} {} ({})",
        installed_mark(&source),
        config.source.calendar_id,
        source.name()
    );

    println!("\n{}", "Destinations".bold());
    for dest in &config.destinations {
        let provider = Provider::from_name(dest.kind.provider_name());
        println!(
            "  {} {}  {} '{}' {}",
            installed_mark(&provider),
            dest.name.bold(),
            dest.kind,
            dest.calendar_name,
            format!("color {}", dest.calendar_color).dimmed()
        );
    }

    Ok(ExitCode::SUCCESS)
}

fn installed_mark(provider: &Provider) -> String {
    match provider.ensure_installed() {
        Ok(()) => "✓".green().to_string(),
        Err(_) => "✗".red().to_string(),
    }
}
