mod commands;
mod prompt;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use calsync_core::config::Config;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "calsync")]
#[command(about = "Mirror a work calendar into personal calendars")]
struct Cli {
    /// Config file (default: ~/.config/calsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log every event compared and why it changed
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile destinations with the source calendar
    Sync {
        /// Only sync this destination (by name)
        #[arg(short, long)]
        destination: Option<String>,

        #[command(flatten)]
        weeks: WeekArgs,
    },
    /// Show the time range the next sync covers
    Window {
        #[command(flatten)]
        weeks: WeekArgs,
    },
    /// List configured destinations and whether their providers are installed
    Destinations,
}

#[derive(Args, Clone, Copy)]
pub struct WeekArgs {
    /// Weeks to sync starting with the current one (overrides config)
    #[arg(long)]
    weeks_forward: Option<u32>,

    /// Past weeks to keep synced (overrides config)
    #[arg(long)]
    weeks_back: Option<u32>,
}

impl WeekArgs {
    pub fn resolve(&self, config: &Config) -> (u32, u32) {
        (
            self.weeks_forward.unwrap_or(config.weeks_forward),
            self.weeks_back.unwrap_or(config.weeks_back),
        )
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Sync { destination, weeks } => {
            commands::sync::run(&config, destination.as_deref(), weeks, cli.verbose).await
        }
        Commands::Window { weeks } => commands::window::run(&config, weeks),
        Commands::Destinations => commands::destinations::run(&config),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,calsync=debug,calsync_core=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        anyhow::bail!(
            "No config file found at {}.\n\n\
            Create one with a [source] section and at least one [[destinations]] entry:\n\n  \
            [source]\n  \
            token_path = \"~/.config/calsync/work_token.json\"\n\n  \
            [[destinations]]\n  \
            name = \"Personal\"\n  \
            kind = \"google\"\n  \
            token_path = \"~/.config/calsync/personal_token.json\"",
            path.display()
        );
    }

    Ok(Config::load(&path)?)
}
