//! Apply a `MatchResult` to the forum: create, update in place, or adopt.

use chrono::Utc;

use crate::config::SyncConfig;
use crate::error::{ForumError, ForumResult};
use crate::event::CalendarEvent;
use crate::fingerprint::carry_marker;
use crate::forum::{BumpSuppression, ExistingTopic, ForumApi, NewTopic};
use crate::matcher::MatchResult;
use crate::render::{needs_rewrite, render_body};

/// What happened to the topic's bump date after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpHandling {
    /// No edit was made.
    NotNeeded,
    /// The forum honored the no-bump request.
    Suppressed,
    /// The edit bumped the topic and the bump date was reset afterwards.
    ResetFallback,
    /// The edit bumped the topic and resetting failed. The edit stands.
    ResetFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    pub body_changed: bool,
    pub tags_written: bool,
    pub bump: BumpHandling,
}

impl UpdateReport {
    pub fn is_noop(&self) -> bool {
        !self.body_changed && !self.tags_written
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created(ExistingTopic),
    /// Topic matched by fingerprint, brought up to date.
    Updated(ExistingTopic, UpdateReport),
    /// Topic matched heuristically, now carries the event's fingerprint.
    Adopted(ExistingTopic, UpdateReport),
}

impl Outcome {
    pub fn topic_id(&self) -> u64 {
        self.topic().topic_id
    }

    /// Snapshot of the topic as it is after reconciliation.
    pub fn topic(&self) -> &ExistingTopic {
        match self {
            Outcome::Created(t) | Outcome::Updated(t, _) | Outcome::Adopted(t, _) => t,
        }
    }
}

pub struct Reconciler<'a> {
    config: &'a SyncConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a SyncConfig) -> Self {
        Reconciler { config }
    }

    pub async fn reconcile<F: ForumApi>(
        &self,
        event: &CalendarEvent,
        found: MatchResult,
        forum: &F,
    ) -> ForumResult<Outcome> {
        match found {
            MatchResult::NoMatch => self.create(event, forum).await.map(Outcome::Created),
            MatchResult::Exact(topic) => {
                let (topic, report) = self.bring_up_to_date(event, topic, forum).await?;
                Ok(Outcome::Updated(topic, report))
            }
            MatchResult::Heuristic { topic, via } => {
                tracing::info!(
                    topic_id = topic.topic_id,
                    event = %event.label(),
                    ?via,
                    "adopting existing topic"
                );
                let (topic, report) = self.bring_up_to_date(event, topic, forum).await?;
                Ok(Outcome::Adopted(topic, report))
            }
        }
    }

    async fn create<F: ForumApi>(
        &self,
        event: &CalendarEvent,
        forum: &F,
    ) -> ForumResult<ExistingTopic> {
        let category_id = self.config.category_id.ok_or(ForumError::MissingCategory)?;

        let mut tags = self.config.tags.clone();
        if let Some(with_fp) = event.fingerprint.as_ref().and_then(|fp| fp.write_tag(&tags)) {
            tags = with_fp;
        }

        let new_topic = NewTopic {
            title: event.summary.clone(),
            body: render_body(event, self.config.site_tz),
            tags,
            category_id,
        };
        let topic_id = forum.create_topic(&new_topic).await?;
        tracing::info!(topic_id, event = %event.label(), "created topic");

        Ok(ExistingTopic {
            topic_id,
            title: new_topic.title,
            body: new_topic.body,
            tags: new_topic.tags,
            category_id: Some(category_id),
            created_at: Utc::now(),
        })
    }

    /// Rewrite the body if it drifted and make sure the fingerprint tag is
    /// present. Tags already on the topic are never removed, and neither is
    /// a hidden marker the event has no fingerprint to replace.
    async fn bring_up_to_date<F: ForumApi>(
        &self,
        event: &CalendarEvent,
        mut topic: ExistingTopic,
        forum: &F,
    ) -> ForumResult<(ExistingTopic, UpdateReport)> {
        let fingerprint = event.fingerprint.as_ref();
        let rendered = match fingerprint {
            Some(_) => render_body(event, self.config.site_tz),
            None => carry_marker(&topic.body, &render_body(event, self.config.site_tz)),
        };

        let mut report = UpdateReport {
            body_changed: false,
            tags_written: false,
            bump: BumpHandling::NotNeeded,
        };

        if needs_rewrite(&topic.body, &rendered, fingerprint) {
            forum.update_first_post(topic.topic_id, &rendered).await?;
            topic.body = rendered;
            report.body_changed = true;
            tracing::info!(topic_id = topic.topic_id, event = %event.label(), "updated topic body");
        }

        if let Some(fp) = fingerprint.filter(|fp| !fp.read_tag(&topic.tags)) {
            match forum.set_tags(topic.topic_id, &[fp.tag()]).await {
                Ok(()) => {
                    topic.tags.push(fp.tag());
                    report.tags_written = true;
                }
                // the marker still identifies the topic on the next run
                Err(err) => tracing::warn!(
                    topic_id = topic.topic_id,
                    error = %err,
                    "could not add fingerprint tag"
                ),
            }
        }

        report.bump = if report.tags_written {
            // tag edits bump the topic regardless of bypass_bump
            self.reset_bump(topic.topic_id, forum).await
        } else if report.body_changed {
            self.handle_bump(topic.topic_id, forum).await
        } else {
            tracing::debug!(topic_id = topic.topic_id, "topic already up to date");
            BumpHandling::NotNeeded
        };
        Ok((topic, report))
    }

    async fn handle_bump<F: ForumApi>(&self, topic_id: u64, forum: &F) -> BumpHandling {
        match forum.suppress_bump(topic_id).await {
            Ok(BumpSuppression::Acknowledged) => return BumpHandling::Suppressed,
            Ok(BumpSuppression::Ignored) => {
                tracing::debug!(topic_id, "edit bumped the topic, resetting bump date");
            }
            Err(err) => {
                tracing::debug!(topic_id, error = %err, "bump check failed, resetting bump date");
            }
        }
        self.reset_bump(topic_id, forum).await
    }

    async fn reset_bump<F: ForumApi>(&self, topic_id: u64, forum: &F) -> BumpHandling {
        match forum.reset_bump_date(topic_id).await {
            Ok(()) => BumpHandling::ResetFallback,
            Err(err) if err.is_permission_denied() => {
                tracing::warn!(
                    topic_id,
                    "cannot reset bump date: API user needs staff rights"
                );
                BumpHandling::ResetFailed
            }
            Err(err) => {
                tracing::warn!(topic_id, error = %err, "bump date reset failed");
                BumpHandling::ResetFailed
            }
        }
    }
}
