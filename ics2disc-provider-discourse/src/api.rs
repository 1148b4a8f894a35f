//! `TopicLookup` / `ForumApi` over the Discourse REST API.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ics2disc_core::fingerprint::MarkerPresence;
use ics2disc_core::{
    BumpSuppression, ExistingTopic, Fingerprint, ForumApi, ForumError, ForumResult, NewTopic,
    TopicLookup,
};

use crate::client::DiscourseClient;
use crate::types::{CreatePostResponse, EventsResponse, LatestResponse, SearchResponse, TopicResponse};

/// The calendar plugin matches on event start, so the query window is padded
/// to also return topics whose times were written shifted by a UTC offset.
const WINDOW_PADDING_HOURS: i64 = 24;

impl DiscourseClient {
    async fn read_topic(&self, topic_id: u64) -> ForumResult<TopicResponse> {
        self.get_json(
            &format!("/t/{topic_id}.json"),
            &[("include_raw", "true".to_string())],
        )
        .await
    }

    async fn search_first_topic(&self, q: String) -> ForumResult<Option<u64>> {
        let response: SearchResponse = self.get_json("/search.json", &[("q", q)]).await?;
        Ok(response.first_topic_id())
    }

    async fn hydrate(&self, ids: Vec<u64>) -> ForumResult<Vec<ExistingTopic>> {
        let mut topics = Vec::with_capacity(ids.len());
        for id in ids {
            topics.push(self.read_topic(id).await?.into_existing());
        }
        Ok(topics)
    }
}

impl TopicLookup for DiscourseClient {
    async fn find_by_fingerprint_tag(
        &self,
        fingerprint: &Fingerprint,
    ) -> ForumResult<Option<ExistingTopic>> {
        for tag in fingerprint.tag_variants() {
            if let Some(id) = self.search_first_topic(format!("tag:{tag}")).await? {
                tracing::debug!(topic_id = id, %tag, "found topic by fingerprint tag");
                return Ok(Some(self.read_topic(id).await?.into_existing()));
            }
        }

        // Tags can be stripped by moderators; the hidden marker survives.
        let Some(id) = self
            .search_first_topic(format!("\"{}\"", fingerprint.marker_token()))
            .await?
        else {
            return Ok(None);
        };
        let topic = self.read_topic(id).await?.into_existing();
        if fingerprint.read_marker(&topic.body) == MarkerPresence::Matches {
            tracing::debug!(topic_id = id, "found topic by hidden marker");
            Ok(Some(topic))
        } else {
            Ok(None)
        }
    }

    async fn find_by_time_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ForumResult<Vec<ExistingTopic>> {
        let padding = Duration::hours(WINDOW_PADDING_HOURS);
        let query = [
            ("after", iso(start - padding)),
            ("before", iso(end + padding)),
        ];
        let response: EventsResponse = self
            .get_json("/discourse-post-event/events.json", &query)
            .await?;
        self.hydrate(response.topic_ids()).await
    }

    async fn list_recent_topics(&self, page: u32) -> ForumResult<Vec<ExistingTopic>> {
        let query = [
            ("page", page.to_string()),
            ("no_definitions", "true".to_string()),
        ];
        let response: LatestResponse = self.get_json("/latest.json", &query).await?;
        let ids = response.topic_list.topics.into_iter().map(|t| t.id).collect();
        self.hydrate(ids).await
    }
}

impl ForumApi for DiscourseClient {
    async fn create_topic(&self, topic: &NewTopic) -> ForumResult<u64> {
        let mut form = vec![
            ("title".to_string(), topic.title.clone()),
            ("raw".to_string(), topic.body.clone()),
            ("category".to_string(), topic.category_id.to_string()),
            ("archetype".to_string(), "regular".to_string()),
        ];
        form.extend(tag_fields(&topic.tags));

        let created: CreatePostResponse = self.post_form("/posts.json", &form).await?;
        Ok(created.topic_id)
    }

    async fn update_first_post(&self, topic_id: u64, body: &str) -> ForumResult<()> {
        let current = self.read_topic(topic_id).await?;
        let post_id = current
            .first_post()
            .map(|p| p.id)
            .ok_or_else(|| ForumError::NotFound(format!("first post of topic {topic_id}")))?;

        self.remember_bump(topic_id, current.bumped_at);
        let form = [
            ("post[raw]".to_string(), body.to_string()),
            // top-level field, not post[bypass_bump]
            ("bypass_bump".to_string(), "true".to_string()),
        ];
        self.put_form(&format!("/posts/{post_id}.json"), &form).await
    }

    async fn set_tags(&self, topic_id: u64, tags: &[String]) -> ForumResult<()> {
        let current = self.read_topic(topic_id).await?.tag_names();
        let Some(merged) = union_tags(&current, tags) else {
            return Ok(());
        };
        self.put_form(&format!("/t/{topic_id}.json"), &tag_fields(&merged))
            .await
    }

    async fn suppress_bump(&self, topic_id: u64) -> ForumResult<BumpSuppression> {
        let Some(before) = self.take_remembered_bump(topic_id) else {
            return Ok(BumpSuppression::Acknowledged);
        };
        let after = self.read_topic(topic_id).await?.bumped_at;
        Ok(bump_outcome(before, after))
    }

    async fn reset_bump_date(&self, topic_id: u64) -> ForumResult<()> {
        self.put_form(&format!("/t/{topic_id}/reset-bump-date"), &[])
            .await
    }
}

impl DiscourseClient {
    fn remember_bump(&self, topic_id: u64, bumped_at: Option<DateTime<Utc>>) {
        if let Ok(mut map) = self.bumped_before_edit.lock() {
            map.insert(topic_id, bumped_at);
        }
    }

    fn take_remembered_bump(&self, topic_id: u64) -> Option<Option<DateTime<Utc>>> {
        self.bumped_before_edit
            .lock()
            .ok()
            .and_then(|mut map| map.remove(&topic_id))
    }
}

fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn tag_fields(tags: &[String]) -> Vec<(String, String)> {
    tags.iter()
        .map(|t| ("tags[]".to_string(), t.clone()))
        .collect()
}

/// `current` plus any of `wanted` it lacks, or `None` when nothing is missing.
fn union_tags(current: &[String], wanted: &[String]) -> Option<Vec<String>> {
    let mut merged = current.to_vec();
    for tag in wanted {
        if !merged.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            merged.push(tag.clone());
        }
    }
    (merged.len() > current.len()).then_some(merged)
}

/// An edit that moved `bumped_at` forward was bumped despite `bypass_bump`.
fn bump_outcome(before: Option<DateTime<Utc>>, after: Option<DateTime<Utc>>) -> BumpSuppression {
    match (before, after) {
        (Some(before), Some(after)) if after > before => BumpSuppression::Ignored,
        (None, Some(_)) => BumpSuppression::Ignored,
        _ => BumpSuppression::Acknowledged,
    }
}
