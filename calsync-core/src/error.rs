//! Error types for calsync.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while reconciling calendars.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Destination '{name}' not found. Available: {available}")]
    DestinationNotFound { name: String, available: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider '{0}' not found in PATH")]
    ProviderNotInstalled(String),

    #[error("Provider request timed out after {0:?}")]
    ProviderTimeout(Duration),

    #[error("Failed to fetch {what}: {source}")]
    Fetch {
        what: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Invalid sync window: {0}")]
    InvalidWindow(String),

    #[error(
        "Calendar '{calendar}' contains {count} event(s) not created by calsync; deletion was not confirmed"
    )]
    DeletionRefused { calendar: String, count: usize },

    #[error(
        "Calendar '{calendar}' contains {count} event(s) not created by calsync and no terminal is attached to confirm their deletion. Run calsync interactively once to confirm, or remove those events by hand"
    )]
    DeletionUnattended { calendar: String, count: usize },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Wrap an error raised while listing events or resolving a calendar.
    pub fn fetch(what: impl Into<String>, source: SyncError) -> Self {
        match source {
            SyncError::Cancelled => SyncError::Cancelled,
            source => SyncError::Fetch {
                what: what.into(),
                source: Box::new(source),
            },
        }
    }
}

/// Result type alias for calsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
