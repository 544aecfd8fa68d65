//! Guard against deleting events someone created by hand in a destination.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{SyncError, SyncResult};

/// Asks the operator a yes/no question.
///
/// Implemented by the CLI over the terminal; tests script the answers.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    /// Whether anyone is there to answer.
    fn is_interactive(&self) -> bool;

    /// Show `message` and read one line. `None` means no answer (EOF, read error).
    async fn ask(&self, message: &str) -> Option<String>;
}

pub struct SafetyGate {
    prompt: Arc<dyn ConfirmationPrompt>,
    // One prompt on the terminal at a time when destinations run concurrently.
    turn: Mutex<()>,
}

impl SafetyGate {
    pub fn new(prompt: Arc<dyn ConfirmationPrompt>) -> Self {
        SafetyGate {
            prompt,
            turn: Mutex::new(()),
        }
    }

    /// Decide whether `untagged` manually created events in `calendar` may be deleted.
    pub async fn check(&self, calendar: &str, untagged: usize) -> SyncResult<()> {
        if untagged == 0 {
            return Ok(());
        }

        if !self.prompt.is_interactive() {
            error!(
                calendar,
                untagged, "calendar contains events not created by calsync; refusing to delete them without a terminal"
            );
            return Err(SyncError::DeletionUnattended {
                calendar: calendar.to_string(),
                count: untagged,
            });
        }

        let _turn = self.turn.lock().await;
        let message = format!(
            "WARNING: The calendar '{calendar}' contains {untagged} manually created event(s).\n\
             calsync will DELETE them because they do not exist in the source calendar."
        );

        let answer = self.prompt.ask(&message).await;
        if answer.as_deref().is_some_and(is_affirmative) {
            info!(calendar, untagged, "deletion of manually created events confirmed");
            Ok(())
        } else {
            warn!(calendar, untagged, "deletion of manually created events declined");
            Err(SyncError::DeletionRefused {
                calendar: calendar.to_string(),
                count: untagged,
            })
        }
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "yes" | "y")
}
