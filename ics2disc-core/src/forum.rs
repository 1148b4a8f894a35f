//! The forum capability surface the core works against.
//!
//! Providers (e.g. `ics2disc-provider-discourse`) implement these traits;
//! matcher and reconciler only ever see `ExistingTopic` snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ForumResult;
use crate::fingerprint::Fingerprint;

/// A topic as observed on the forum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingTopic {
    pub topic_id: u64,
    pub title: String,
    /// Raw markdown of the first post
    pub body: String,
    pub tags: Vec<String>,
    pub category_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl ExistingTopic {
    /// Does the topic's `[event]` window overlap `[start, end]`?
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>, site_tz: chrono_tz::Tz) -> bool {
        let Some(block) = crate::render::EventBlock::parse(&self.body) else {
            return false;
        };
        match (block.start(site_tz), block.end(site_tz)) {
            (Some(s), Some(e)) => s <= end && e >= start,
            (Some(s), None) => s >= start && s <= end,
            _ => false,
        }
    }
}

/// A topic to be created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTopic {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub category_id: u64,
}

/// Whether the forum honored the request not to bump a topic on edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpSuppression {
    Acknowledged,
    Ignored,
}

/// Read side used by the matcher.
#[allow(async_fn_in_trait)]
pub trait TopicLookup {
    /// Topic carrying the fingerprint tag (or, failing that, its hidden marker).
    async fn find_by_fingerprint_tag(&self, fingerprint: &Fingerprint)
    -> ForumResult<Option<ExistingTopic>>;

    /// Topics whose event window overlaps `[start, end]`.
    async fn find_by_time_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ForumResult<Vec<ExistingTopic>>;

    /// One page of the most-recent-first topic listing. An empty page means
    /// the listing is exhausted.
    async fn list_recent_topics(&self, page: u32) -> ForumResult<Vec<ExistingTopic>>;
}

/// Write side used by the reconciler.
#[allow(async_fn_in_trait)]
pub trait ForumApi: TopicLookup {
    async fn create_topic(&self, topic: &NewTopic) -> ForumResult<u64>;

    /// Replace the first post body, asking the forum not to bump the topic.
    async fn update_first_post(&self, topic_id: u64, body: &str) -> ForumResult<()>;

    /// Add tags to a topic. Existing tags are never removed.
    async fn set_tags(&self, topic_id: u64, tags: &[String]) -> ForumResult<()>;

    /// Report whether the last edit left the topic's bump date alone.
    async fn suppress_bump(&self, topic_id: u64) -> ForumResult<BumpSuppression>;

    /// Restore the topic's bump date. Needs staff credentials on Discourse.
    async fn reset_bump_date(&self, topic_id: u64) -> ForumResult<()>;
}
