//! One pass over a feed: normalize, match, reconcile, count.
//!
//! Events are handled one at a time in feed order. A failure on one event is
//! logged and counted, and the pass moves on; nothing is retried within a run.

use crate::config::SyncConfig;
use crate::event::{RawEvent, normalize};
use crate::forum::{ForumApi, TopicLookup};
use crate::ledger::{LedgerLookup, RunLedger};
use crate::matcher::{MatchResult, MatchSource, Matcher};
use crate::reconcile::{Outcome, Reconciler};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub adopted: usize,
    /// Matched topics that needed no change
    pub unchanged: usize,
    /// Events rejected by normalization
    pub skipped: usize,
    /// Events whose forum calls failed
    pub failed: usize,
}

impl SyncStats {
    fn count(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Created(_) => self.created += 1,
            Outcome::Updated(_, report) | Outcome::Adopted(_, report) if report.is_noop() => {
                self.unchanged += 1
            }
            Outcome::Updated(..) => self.updated += 1,
            Outcome::Adopted(..) => self.adopted += 1,
        }
    }
}

pub async fn sync_events<F: ForumApi>(
    events: Vec<RawEvent>,
    forum: &F,
    config: &SyncConfig,
) -> SyncStats {
    let matcher = Matcher::new(config);
    let reconciler = Reconciler::new(config);
    let mut ledger = RunLedger::new();
    let mut stats = SyncStats::default();

    for raw in events {
        stats.processed += 1;

        let event = match normalize(raw, config) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "skipping event");
                stats.skipped += 1;
                continue;
            }
        };

        let found = {
            let lookup = LedgerLookup::new(&ledger, forum, config.site_tz);
            matcher.find(&event, &lookup).await
        };
        let found = match found {
            Ok(found) => found,
            Err(err) => {
                tracing::error!(event = %event.label(), error = %err, "lookup failed, skipping event");
                stats.failed += 1;
                continue;
            }
        };

        match reconciler.reconcile(&event, found, forum).await {
            Ok(outcome) => {
                stats.count(&outcome);
                ledger.record(outcome.topic().clone());
            }
            Err(err) => {
                tracing::error!(event = %event.label(), error = %err, "sync failed for event");
                stats.failed += 1;
            }
        }
    }

    tracing::info!(
        processed = stats.processed,
        created = stats.created,
        updated = stats.updated,
        adopted = stats.adopted,
        unchanged = stats.unchanged,
        skipped = stats.skipped,
        failed = stats.failed,
        touched = ledger.len(),
        "sync pass complete"
    );
    stats
}

/// What a sync pass would do with one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Create,
    Update { topic_id: u64 },
    Adopt { topic_id: u64, via: MatchSource },
    Skip(String),
    Fail(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedEvent {
    pub label: String,
    pub decision: Decision,
}

/// Normalize and match every event without writing anything.
pub async fn plan_events<L: TopicLookup>(
    events: Vec<RawEvent>,
    lookup: &L,
    config: &SyncConfig,
) -> Vec<PlannedEvent> {
    let matcher = Matcher::new(config);
    let mut plan = Vec::with_capacity(events.len());

    for raw in events {
        let fallback_label = raw
            .summary
            .clone()
            .or_else(|| raw.uid.clone())
            .unwrap_or_else(|| crate::event::UNTITLED_EVENT.to_string());

        let event = match normalize(raw, config) {
            Ok(event) => event,
            Err(err) => {
                plan.push(PlannedEvent {
                    label: fallback_label,
                    decision: Decision::Skip(err.to_string()),
                });
                continue;
            }
        };

        let decision = match matcher.find(&event, lookup).await {
            Ok(MatchResult::NoMatch) => Decision::Create,
            Ok(MatchResult::Exact(topic)) => Decision::Update {
                topic_id: topic.topic_id,
            },
            Ok(MatchResult::Heuristic { topic, via }) => Decision::Adopt {
                topic_id: topic.topic_id,
                via,
            },
            Err(err) => Decision::Fail(err.to_string()),
        };
        plan.push(PlannedEvent {
            label: event.label(),
            decision,
        });
    }
    plan
}
