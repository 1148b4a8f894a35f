//! Topics created or adopted during the current run.
//!
//! Forum search indexes lag behind writes, so a feed that lists the same
//! event twice could otherwise create two topics in one run. `LedgerLookup`
//! answers from the ledger first and merges it into forum results.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::ForumResult;
use crate::fingerprint::{Fingerprint, MarkerPresence};
use crate::forum::{ExistingTopic, TopicLookup};

#[derive(Debug, Default)]
pub struct RunLedger {
    topics: Vec<ExistingTopic>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) the snapshot of a topic this run wrote to.
    pub fn record(&mut self, topic: ExistingTopic) {
        match self.topics.iter_mut().find(|t| t.topic_id == topic.topic_id) {
            Some(existing) => *existing = topic,
            None => self.topics.push(topic),
        }
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<&ExistingTopic> {
        self.topics.iter().find(|t| {
            fingerprint.read_tag(&t.tags)
                || fingerprint.read_marker(&t.body) == MarkerPresence::Matches
        })
    }

    /// Ledger topics, most recently written first.
    fn recent(&self) -> impl Iterator<Item = &ExistingTopic> {
        self.topics.iter().rev()
    }
}

/// A `TopicLookup` that consults the run ledger before the forum.
pub struct LedgerLookup<'a, L> {
    ledger: &'a RunLedger,
    inner: &'a L,
    site_tz: Tz,
}

impl<'a, L: TopicLookup> LedgerLookup<'a, L> {
    pub fn new(ledger: &'a RunLedger, inner: &'a L, site_tz: Tz) -> Self {
        LedgerLookup {
            ledger,
            inner,
            site_tz,
        }
    }
}

/// Ledger snapshots replace forum copies of the same topic.
fn merge(fresh: Vec<&ExistingTopic>, forum: Vec<ExistingTopic>) -> Vec<ExistingTopic> {
    let mut merged: Vec<ExistingTopic> = fresh.into_iter().cloned().collect();
    for topic in forum {
        if !merged.iter().any(|t| t.topic_id == topic.topic_id) {
            merged.push(topic);
        }
    }
    merged
}

impl<L: TopicLookup> TopicLookup for LedgerLookup<'_, L> {
    async fn find_by_fingerprint_tag(
        &self,
        fingerprint: &Fingerprint,
    ) -> ForumResult<Option<ExistingTopic>> {
        if let Some(topic) = self.ledger.by_fingerprint(fingerprint) {
            return Ok(Some(topic.clone()));
        }
        self.inner.find_by_fingerprint_tag(fingerprint).await
    }

    async fn find_by_time_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ForumResult<Vec<ExistingTopic>> {
        let forum = self.inner.find_by_time_window(start, end).await?;
        let fresh = self
            .ledger
            .recent()
            .filter(|t| t.overlaps(start, end, self.site_tz))
            .collect();
        Ok(merge(fresh, forum))
    }

    async fn list_recent_topics(&self, page: u32) -> ForumResult<Vec<ExistingTopic>> {
        let forum = self.inner.list_recent_topics(page).await?;
        let fresh = if page == 0 {
            self.ledger.recent().collect()
        } else {
            Vec::new()
        };
        let merged = merge(fresh, forum);
        // keep later pages from repeating what page 0 already yielded
        if page == 0 {
            Ok(merged)
        } else {
            Ok(merged
                .into_iter()
                .filter(|t| !self.ledger.topics.iter().any(|l| l.topic_id == t.topic_id))
                .collect())
        }
    }
}
