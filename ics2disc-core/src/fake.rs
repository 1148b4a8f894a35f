//! In-memory forum used by the core's tests.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::{ForumError, ForumResult};
use crate::fingerprint::{Fingerprint, MarkerPresence};
use crate::forum::{BumpSuppression, ExistingTopic, ForumApi, NewTopic, TopicLookup};
use crate::render::block_time;

const PAGE_SIZE: usize = 2;
const FIRST_CREATED_ID: u64 = 100;

fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// A topic whose body holds a bare `[event]` block. `created_at` grows with
/// the id so higher ids are more recent.
pub(crate) fn topic_at(id: u64, start: &str, end: &str, location: Option<&str>) -> ExistingTopic {
    let tz = chrono_tz::Europe::London;
    let start: DateTime<Utc> = DateTime::parse_from_rfc3339(start).unwrap().into();
    let end: DateTime<Utc> = DateTime::parse_from_rfc3339(end).unwrap().into();
    let location = location
        .map(|l| format!(r#" location="{l}""#))
        .unwrap_or_default();

    ExistingTopic {
        topic_id: id,
        title: format!("Topic {id}"),
        body: format!(
            "[event start=\"{}\" end=\"{}\"{location} timezone=\"Europe/London\"]\n[/event]\n",
            block_time(start, tz),
            block_time(end, tz),
        ),
        tags: Vec::new(),
        category_id: Some(1),
        created_at: epoch() + Duration::minutes(id as i64),
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Calls {
    pub tag_searches: usize,
    pub window_searches: usize,
    pub recent_pages: Vec<u32>,
    pub creates: usize,
    pub post_updates: usize,
    pub tag_writes: usize,
    pub bump_checks: usize,
    pub bump_resets: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Behavior {
    pub fail_tag_search: bool,
    pub fail_window_search: bool,
    pub ignore_bump_suppression: bool,
    pub deny_bump_reset: bool,
    /// Topic creation fails for titles containing this text
    pub fail_create_titled: Option<String>,
    /// Searches and listings never see topics created through the fake,
    /// like a search index that has not caught up yet
    pub lagging_index: bool,
}

#[derive(Debug)]
struct State {
    topics: Vec<ExistingTopic>,
    next_id: u64,
    calls: Calls,
    behavior: Behavior,
}

impl State {
    /// Topics visible to searches and listings.
    fn indexed(&self) -> impl Iterator<Item = &ExistingTopic> {
        let lagging = self.behavior.lagging_index;
        self.topics
            .iter()
            .filter(move |t| !lagging || t.topic_id < FIRST_CREATED_ID)
    }
}

pub(crate) struct FakeForum {
    state: Mutex<State>,
}

impl FakeForum {
    pub fn new() -> Self {
        FakeForum {
            state: Mutex::new(State {
                topics: Vec::new(),
                next_id: FIRST_CREATED_ID,
                calls: Calls::default(),
                behavior: Behavior::default(),
            }),
        }
    }

    pub fn with_behavior(behavior: Behavior) -> Self {
        let forum = Self::new();
        forum.state.lock().unwrap().behavior = behavior;
        forum
    }

    pub fn seed(&self, topic: ExistingTopic) {
        self.state.lock().unwrap().topics.push(topic);
    }

    pub fn topics(&self) -> Vec<ExistingTopic> {
        self.state.lock().unwrap().topics.clone()
    }

    pub fn topic(&self, id: u64) -> ExistingTopic {
        self.topics()
            .into_iter()
            .find(|t| t.topic_id == id)
            .expect("topic exists")
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls = Calls::default();
    }
}

impl TopicLookup for FakeForum {
    async fn find_by_fingerprint_tag(
        &self,
        fingerprint: &Fingerprint,
    ) -> ForumResult<Option<ExistingTopic>> {
        let mut state = self.state.lock().unwrap();
        state.calls.tag_searches += 1;
        if state.behavior.fail_tag_search {
            return Err(ForumError::Http("tag search unavailable".into()));
        }
        let by_tag = state.indexed().find(|t| fingerprint.read_tag(&t.tags));
        let by_marker = || {
            state
                .indexed()
                .find(|t| fingerprint.read_marker(&t.body) == MarkerPresence::Matches)
        };
        Ok(by_tag.or_else(by_marker).cloned())
    }

    async fn find_by_time_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ForumResult<Vec<ExistingTopic>> {
        let mut state = self.state.lock().unwrap();
        state.calls.window_searches += 1;
        if state.behavior.fail_window_search {
            return Err(ForumError::Status {
                status: 404,
                path: "/discourse-post-event/events.json".into(),
                body: "not found".into(),
            });
        }
        Ok(state
            .indexed()
            .filter(|t| t.overlaps(start, end, chrono_tz::Europe::London))
            .cloned()
            .collect())
    }

    async fn list_recent_topics(&self, page: u32) -> ForumResult<Vec<ExistingTopic>> {
        let mut state = self.state.lock().unwrap();
        state.calls.recent_pages.push(page);
        let mut recent: Vec<ExistingTopic> = state.indexed().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(recent
            .into_iter()
            .skip(page as usize * PAGE_SIZE)
            .take(PAGE_SIZE)
            .collect())
    }
}

impl ForumApi for FakeForum {
    async fn create_topic(&self, topic: &NewTopic) -> ForumResult<u64> {
        let mut state = self.state.lock().unwrap();
        let rejected = state
            .behavior
            .fail_create_titled
            .as_ref()
            .is_some_and(|needle| topic.title.contains(needle.as_str()));
        if rejected {
            return Err(ForumError::Status {
                status: 422,
                path: "/posts.json".into(),
                body: "title is invalid".into(),
            });
        }
        state.calls.creates += 1;
        let id = state.next_id;
        state.next_id += 1;
        state.topics.push(ExistingTopic {
            topic_id: id,
            title: topic.title.clone(),
            body: topic.body.clone(),
            tags: topic.tags.clone(),
            category_id: Some(topic.category_id),
            created_at: epoch() + Duration::minutes(id as i64),
        });
        Ok(id)
    }

    async fn update_first_post(&self, topic_id: u64, body: &str) -> ForumResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.post_updates += 1;
        let topic = state
            .topics
            .iter_mut()
            .find(|t| t.topic_id == topic_id)
            .ok_or_else(|| ForumError::Status {
                status: 404,
                path: format!("/t/{topic_id}.json"),
                body: String::new(),
            })?;
        topic.body = body.to_string();
        Ok(())
    }

    async fn set_tags(&self, topic_id: u64, tags: &[String]) -> ForumResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.tag_writes += 1;
        if let Some(topic) = state.topics.iter_mut().find(|t| t.topic_id == topic_id) {
            for tag in tags {
                if !topic.tags.contains(tag) {
                    topic.tags.push(tag.clone());
                }
            }
        }
        Ok(())
    }

    async fn suppress_bump(&self, _topic_id: u64) -> ForumResult<BumpSuppression> {
        let mut state = self.state.lock().unwrap();
        state.calls.bump_checks += 1;
        Ok(if state.behavior.ignore_bump_suppression {
            BumpSuppression::Ignored
        } else {
            BumpSuppression::Acknowledged
        })
    }

    async fn reset_bump_date(&self, topic_id: u64) -> ForumResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.bump_resets += 1;
        if state.behavior.deny_bump_reset {
            return Err(ForumError::PermissionDenied(format!(
                "/t/{topic_id}/reset-bump-date"
            )));
        }
        Ok(())
    }
}
