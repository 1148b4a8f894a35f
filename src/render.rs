//! Colored terminal output for sync results.

use ics2disc_core::matcher::MatchSource;
use ics2disc_core::{Decision, PlannedEvent, SyncStats};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for Decision {
    fn render(&self) -> String {
        match self {
            Decision::Create => "+".green().to_string(),
            Decision::Update { .. } => "~".yellow().to_string(),
            Decision::Adopt { .. } => "=".cyan().to_string(),
            Decision::Skip(_) => "-".dimmed().to_string(),
            Decision::Fail(_) => "!".red().to_string(),
        }
    }
}

impl Render for PlannedEvent {
    fn render(&self) -> String {
        let detail = match &self.decision {
            Decision::Create => "new topic".to_string(),
            Decision::Update { topic_id } => format!("topic {topic_id}"),
            Decision::Adopt { topic_id, via } => {
                let via = match via {
                    MatchSource::Search => "time window",
                    MatchSource::Scan => "recent topics",
                };
                format!("adopt topic {topic_id} (found via {via})")
            }
            Decision::Skip(reason) => format!("skipped: {reason}"),
            Decision::Fail(reason) => {
                return format!("{} {} {}", self.decision.render(), self.label, reason.red());
            }
        };
        format!("{} {} {}", self.decision.render(), self.label, detail.dimmed())
    }
}

impl Render for SyncStats {
    fn render(&self) -> String {
        let mut parts = vec![
            format!("{} created", self.created).green().to_string(),
            format!("{} updated", self.updated).yellow().to_string(),
            format!("{} adopted", self.adopted).cyan().to_string(),
            format!("{} unchanged", self.unchanged).dimmed().to_string(),
        ];
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped));
        }
        if self.failed > 0 {
            parts.push(format!("{} failed", self.failed).red().to_string());
        }
        format!("{} events: {}", self.processed, parts.join(", "))
    }
}
