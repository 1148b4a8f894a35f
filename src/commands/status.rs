use anyhow::Result;
use ics2disc_core::{Decision, PlannedEvent, plan_events};
use owo_colors::OwoColorize;

use super::connect;
use crate::SyncArgs;
use crate::config::Settings;
use crate::feed::fetch_and_parse;
use crate::render::Render;

/// Print what `sync` would do for each event. Read-only, so no lock is taken.
pub async fn run(args: &SyncArgs) -> Result<()> {
    let settings = Settings::load(args)?;
    let client = connect(&settings).await?;
    let events = fetch_and_parse(&args.ics, settings.discourse.timeout, &settings.discourse.backoff).await?;

    let plan = plan_events(events, &client, &settings.sync).await;
    for line in render_plan(&plan) {
        println!("{line}");
    }
    Ok(())
}

fn render_plan(plan: &[PlannedEvent]) -> Vec<String> {
    if plan.is_empty() {
        return vec!["No events in feed".dimmed().to_string()];
    }

    let mut lines: Vec<String> = plan.iter().map(|p| p.render()).collect();
    let creates = count(plan, |d| matches!(d, Decision::Create));
    let updates = count(plan, |d| matches!(d, Decision::Update { .. } | Decision::Adopt { .. }));
    lines.push(String::new());
    lines.push(
        format!("{creates} to create, {updates} to check for changes")
            .dimmed()
            .to_string(),
    );
    lines
}

fn count(plan: &[PlannedEvent], pred: impl Fn(&Decision) -> bool) -> usize {
    plan.iter().filter(|p| pred(&p.decision)).count()
}
