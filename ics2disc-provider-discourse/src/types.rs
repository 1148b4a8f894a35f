//! Discourse API response shapes.
//!
//! Only the fields the sync reads are modeled, and everything is lenient:
//! Discourse versions and plugins disagree about which fields are present.

use chrono::{DateTime, Utc};
use ics2disc_core::ExistingTopic;
use serde::Deserialize;

/// A topic reference in search results and listings.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicRef {
    pub id: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicList {
    #[serde(default)]
    pub topics: Vec<TopicRef>,
}

/// `GET /search.json`. Older versions nest topics under `topic_list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub topics: Vec<TopicRef>,
    #[serde(default)]
    pub topic_list: Option<TopicList>,
}

impl SearchResponse {
    pub fn first_topic_id(&self) -> Option<u64> {
        self.topics
            .first()
            .or_else(|| self.topic_list.as_ref()?.topics.first())
            .map(|t| t.id)
    }
}

/// `GET /latest.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestResponse {
    #[serde(default)]
    pub topic_list: TopicList,
}

/// Tags come back as plain names or, with some settings, as objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagRef {
    Name(String),
    Object { name: String },
}

impl TagRef {
    pub fn into_name(self) -> String {
        match self {
            TagRef::Name(name) | TagRef::Object { name } => name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub id: u64,
    #[serde(default)]
    pub post_number: Option<u32>,
    #[serde(default)]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostStream {
    #[serde(default)]
    pub posts: Vec<Post>,
}

/// `GET /t/{id}.json?include_raw=true`
#[derive(Debug, Clone, Deserialize)]
pub struct TopicResponse {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category_id: Option<u64>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bumped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub post_stream: PostStream,
}

impl TopicResponse {
    pub fn first_post(&self) -> Option<&Post> {
        self.post_stream
            .posts
            .iter()
            .find(|p| p.post_number == Some(1))
            .or_else(|| self.post_stream.posts.first())
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().cloned().map(TagRef::into_name).collect()
    }

    pub fn into_existing(self) -> ExistingTopic {
        let body = self
            .first_post()
            .and_then(|p| p.raw.clone())
            .unwrap_or_default();
        let tags = self.tag_names();
        ExistingTopic {
            topic_id: self.id,
            title: self.title,
            body,
            tags,
            category_id: self.category_id,
            // unknown creation time sorts as oldest
            created_at: self.created_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

/// `POST /posts.json`
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostResponse {
    pub topic_id: u64,
}

/// `GET /session/current.json`
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentSession {
    pub current_user: CurrentUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    pub username: String,
}

/// `GET /discourse-post-event/events.json` from the calendar plugin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsResponse {
    #[serde(default)]
    pub events: Vec<PostEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostEvent {
    #[serde(default)]
    pub post: Option<EventPost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventPost {
    #[serde(default)]
    pub topic: Option<TopicRef>,
}

impl EventsResponse {
    /// Topic ids in response order, without repeats.
    pub fn topic_ids(&self) -> Vec<u64> {
        let mut ids = Vec::new();
        for id in self
            .events
            .iter()
            .filter_map(|e| e.post.as_ref()?.topic.as_ref().map(|t| t.id))
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}
