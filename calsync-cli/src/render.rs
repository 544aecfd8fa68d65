//! Terminal rendering for sync results.

use calsync_core::orchestrator::{BatchReport, DestinationReport};
use calsync_core::reconcile::SyncStats;
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for SyncStats {
    fn render(&self) -> String {
        let mut parts = vec![
            format!("+{}", self.created).green().to_string(),
            format!("~{}", self.updated).yellow().to_string(),
            format!("-{}", self.deleted).red().to_string(),
            format!("={}", self.unchanged).dimmed().to_string(),
        ];
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed).red().bold().to_string());
        }
        parts.join(" ")
    }
}

impl Render for DestinationReport {
    fn render(&self) -> String {
        match &self.result {
            Ok(stats) => format!("{} {}  {}", "✓".green(), self.name.bold(), stats.render()),
            Err(e) => format!("{} {}  {}", "✗".red(), self.name.bold(), e.to_string().red()),
        }
    }
}

impl Render for BatchReport {
    fn render(&self) -> String {
        let mut lines: Vec<String> = self.0.iter().map(Render::render).collect();

        let failed = self.failures().count();
        let totals = self.totals();
        if self.0.len() > 1 || failed > 0 {
            lines.push(String::new());
            lines.push(format!("Total: {totals}"));
        }
        if failed > 0 {
            lines.push(
                format!("{failed} of {} destination(s) failed", self.0.len())
                    .red()
                    .to_string(),
            );
        }

        lines.join("\n")
    }
}
