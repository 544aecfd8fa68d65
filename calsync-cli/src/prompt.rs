use std::io::IsTerminal;

use async_trait::async_trait;
use calsync_core::safety::ConfirmationPrompt;
use dialoguer::Input;
use owo_colors::OwoColorize;

/// Asks on the controlling terminal.
pub struct TerminalPrompt;

#[async_trait]
impl ConfirmationPrompt for TerminalPrompt {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    async fn ask(&self, message: &str) -> Option<String> {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            eprintln!("\n{}", message.yellow());
            Input::<String>::new()
                .with_prompt("Type 'yes' to delete them")
                .allow_empty(true)
                .interact_text()
                .ok()
        })
        .await
        .ok()
        .flatten()
    }
}
