//! calsync configuration.
//!
//! Read from `~/.config/calsync/config.toml` (or an explicit path), with
//! `CALSYNC_*` environment variables layered on top:
//!
//! ```toml
//! weeks_forward = 2
//! weeks_back = 0
//! timezone = "Europe/Berlin"
//!
//! [source]
//! token_path = "~/.config/calsync/work_token.json"
//!
//! [[destinations]]
//! name = "Personal"
//! kind = "google"
//! token_path = "~/.config/calsync/personal_token.json"
//!
//! [[destinations]]
//! name = "iCloud"
//! kind = "apple"
//! server_url = "https://caldav.icloud.com"
//! username = "me@icloud.com"
//! password = "app-specific-password"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::window::{DEFAULT_WEEKS_BACK, DEFAULT_WEEKS_FORWARD};

const DEFAULT_CALENDAR_NAME: &str = "Work Sync";
/// Google's "Grape".
const DEFAULT_CALENDAR_COLOR: &str = "7";
const DEFAULT_SOURCE_PROVIDER: &str = "google";
const DEFAULT_SOURCE_CALENDAR: &str = "primary";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

fn default_weeks_forward() -> u32 {
    DEFAULT_WEEKS_FORWARD
}

fn default_weeks_back() -> u32 {
    DEFAULT_WEEKS_BACK
}

fn default_concurrency() -> usize {
    1
}

fn default_provider_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

fn default_calendar_name() -> String {
    DEFAULT_CALENDAR_NAME.to_string()
}

fn default_calendar_color() -> String {
    DEFAULT_CALENDAR_COLOR.to_string()
}

fn default_source_provider() -> String {
    DEFAULT_SOURCE_PROVIDER.to_string()
}

fn default_source_calendar() -> String {
    DEFAULT_SOURCE_CALENDAR.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Weeks to mirror starting with the current one.
    #[serde(default = "default_weeks_forward")]
    pub weeks_forward: u32,

    /// Past weeks to keep mirrored.
    #[serde(default = "default_weeks_back")]
    pub weeks_back: u32,

    /// IANA zone for week boundaries and the 06:00-24:00 filter. Host zone if unset.
    pub timezone: Option<String>,

    /// Destinations synced at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub destinations: Vec<Destination>,
}

/// The authoritative calendar. Read only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_provider")]
    pub provider: String,

    #[serde(default = "default_source_calendar")]
    pub calendar_id: String,

    pub token_path: Option<PathBuf>,

    #[serde(default)]
    pub params: ProviderParams,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            provider: default_source_provider(),
            calendar_id: default_source_calendar(),
            token_path: None,
            params: ProviderParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// Google Calendar REST API, OAuth token on disk
    Google,
    /// iCloud (or any CalDAV server), app-specific password
    Apple,
}

impl DestinationKind {
    /// Suffix of the `calsync-provider-*` executable serving this kind.
    pub fn provider_name(&self) -> &'static str {
        match self {
            DestinationKind::Google => "google",
            DestinationKind::Apple => "apple",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_name())
    }
}

/// One calendar the source is mirrored into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    /// Used in logs and for `--destination`.
    #[serde(default)]
    pub name: String,

    pub kind: DestinationKind,

    #[serde(default = "default_calendar_name")]
    pub calendar_name: String,

    #[serde(default = "default_calendar_color")]
    pub calendar_color: String,

    // Google
    pub token_path: Option<PathBuf>,

    // Apple / CalDAV
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,

    /// Extra provider-specific settings passed through verbatim.
    #[serde(default)]
    pub params: ProviderParams,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderParams(pub BTreeMap<String, toml::Value>);

impl From<&ProviderParams> for serde_json::Map<String, serde_json::Value> {
    fn from(params: &ProviderParams) -> Self {
        params
            .0
            .iter()
            .filter_map(|(k, v)| serde_json::to_value(v).ok().map(|v| (k.clone(), v)))
            .collect()
    }
}

impl Config {
    pub fn default_path() -> SyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join("calsync");

        Ok(config_dir.join("config.toml"))
    }

    /// Load and validate the config file, applying `CALSYNC_*` overrides.
    pub fn load(path: &Path) -> SyncResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`Config::load`], reading overrides from `env` instead of the process
    /// environment when given.
    pub fn load_with_env(path: &Path, env: Option<HashMap<String, String>>) -> SyncResult<Self> {
        if !path.exists() {
            return Err(SyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let environment = Environment::with_prefix("CALSYNC")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env.map(|vars| vars.into_iter().collect()));

        let mut config: Config = config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(environment)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;

        config.validate()?;
        Ok(config)
    }

    /// Fill in defaults and reject incomplete destinations.
    pub fn validate(&mut self) -> SyncResult<()> {
        if self.weeks_forward == 0 {
            return Err(SyncError::Config(
                "weeks_forward must be at least 1 (the current week)".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(SyncError::Config("concurrency must be at least 1".into()));
        }
        if let Some(tz) = &self.timezone {
            tz.parse::<Tz>()
                .map_err(|_| SyncError::Config(format!("Unknown timezone '{tz}'")))?;
        }
        if self.destinations.is_empty() {
            return Err(SyncError::Config(
                "At least one [[destinations]] entry is required".into(),
            ));
        }

        for (i, dest) in self.destinations.iter_mut().enumerate() {
            if dest.name.is_empty() {
                dest.name = format!("Destination {}", i + 1);
            }
            dest.validate(i)?;
        }

        let mut seen = std::collections::HashSet::new();
        for dest in &self.destinations {
            if !seen.insert(dest.name.as_str()) {
                return Err(SyncError::Config(format!(
                    "Destination name '{}' is used more than once",
                    dest.name
                )));
            }
        }

        Ok(())
    }

    /// Zone used for week boundaries and the day-window filter.
    pub fn timezone(&self) -> SyncResult<Tz> {
        match &self.timezone {
            Some(name) => name
                .parse()
                .map_err(|_| SyncError::Config(format!("Unknown timezone '{name}'"))),
            None => Ok(host_timezone()),
        }
    }

    /// Destinations to run: all of them, or just the one named.
    pub fn select(&self, name: Option<&str>) -> SyncResult<Vec<&Destination>> {
        match name {
            None => Ok(self.destinations.iter().collect()),
            Some(name) => match self.destinations.iter().find(|d| d.name == name) {
                Some(dest) => Ok(vec![dest]),
                None => Err(SyncError::DestinationNotFound {
                    name: name.to_string(),
                    available: self
                        .destinations
                        .iter()
                        .map(|d| d.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                }),
            },
        }
    }
}

impl SourceConfig {
    pub fn provider_params(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut params = serde_json::Map::new();
        if let Some(path) = &self.token_path {
            params.insert("token_path".into(), expand_path(path).into());
        }
        params.extend(serde_json::Map::from(&self.params));
        params
    }
}

impl Destination {
    fn validate(&self, index: usize) -> SyncResult<()> {
        let missing = |field: &str| {
            SyncError::Config(format!(
                "destination[{index}] (name: {}): {field} must be provided for {} destinations",
                self.name, self.kind
            ))
        };

        match self.kind {
            DestinationKind::Google => {
                if self.token_path.is_none() {
                    return Err(missing("token_path"));
                }
            }
            DestinationKind::Apple => {
                if self.server_url.as_deref().is_none_or(str::is_empty) {
                    return Err(missing("server_url"));
                }
                if self.username.as_deref().is_none_or(str::is_empty) {
                    return Err(missing("username"));
                }
                if self.password.as_deref().is_none_or(str::is_empty) {
                    return Err(missing("password"));
                }
            }
        }
        Ok(())
    }

    /// Token file with `~` expanded.
    pub fn token_path(&self) -> Option<PathBuf> {
        self.token_path.as_deref().map(|p| PathBuf::from(expand_path(p)))
    }

    /// Parameters sent with every provider request for this destination.
    pub fn provider_params(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut params = serde_json::Map::new();
        if let Some(path) = self.token_path() {
            params.insert("token_path".into(), path.to_string_lossy().into_owned().into());
        }
        if let Some(url) = &self.server_url {
            params.insert("server_url".into(), url.clone().into());
        }
        if let Some(username) = &self.username {
            params.insert("username".into(), username.clone().into());
        }
        if let Some(password) = &self.password {
            params.insert("password".into(), password.clone().into());
        }
        params.extend(serde_json::Map::from(&self.params));
        params
    }
}

fn expand_path(path: &Path) -> String {
    shellexpand::tilde(&path.to_string_lossy()).into_owned()
}

fn host_timezone() -> Tz {
    match iana_time_zone::get_timezone() {
        Ok(name) => name.parse().unwrap_or_else(|_| {
            warn!(zone = %name, "host timezone not recognised, using UTC");
            Tz::UTC
        }),
        Err(e) => {
            warn!("could not detect host timezone, using UTC: {e}");
            Tz::UTC
        }
    }
}
