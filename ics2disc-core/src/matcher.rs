//! Decide which existing topic, if any, already represents an event.
//!
//! The cascade stops at the first step that finds something:
//! 1. fingerprint tag (exact, no further checks)
//! 2. time-window search, verified by `TopicMatchKey`
//! 3. scan of the recent-topics listing, only when step 2 *failed*
//!
//! An empty search result is an answer, not a failure, so it never triggers
//! the scan.

use chrono_tz::Tz;

use crate::config::{DedupeMode, SyncConfig};
use crate::error::ForumResult;
use crate::event::CalendarEvent;
use crate::forum::{ExistingTopic, TopicLookup};
use crate::match_key::TopicMatchKey;

/// How a heuristic match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Search,
    Scan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// Topic carries the event's fingerprint.
    Exact(ExistingTopic),
    /// Topic's time window (and location, in strict mode) equals the event's.
    Heuristic {
        topic: ExistingTopic,
        via: MatchSource,
    },
    NoMatch,
}

impl MatchResult {
    pub fn topic(&self) -> Option<&ExistingTopic> {
        match self {
            MatchResult::Exact(topic) | MatchResult::Heuristic { topic, .. } => Some(topic),
            MatchResult::NoMatch => None,
        }
    }
}

/// Pick among several topics that all satisfy the match key.
///
/// Most recently created wins, ties going to the higher topic id. This is a
/// heuristic (a later topic most likely came from the latest feed sync), kept
/// here so it can be changed without touching the cascade.
pub fn prefer_most_recent(candidates: Vec<ExistingTopic>) -> Option<ExistingTopic> {
    candidates
        .into_iter()
        .max_by_key(|t| (t.created_at, t.topic_id))
}

pub struct Matcher<'a> {
    config: &'a SyncConfig,
}

impl<'a> Matcher<'a> {
    pub fn new(config: &'a SyncConfig) -> Self {
        Matcher { config }
    }

    pub async fn find<L: TopicLookup>(
        &self,
        event: &CalendarEvent,
        lookup: &L,
    ) -> ForumResult<MatchResult> {
        if let Some(found) = self.by_fingerprint(event, lookup).await? {
            return Ok(found);
        }

        let keys = self.candidate_keys(event);
        let found = match self.by_time_window(event, &keys, lookup).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(
                    event = %event.label(),
                    error = %err,
                    "time-window search failed, scanning recent topics"
                );
                self.by_recent_scan(&keys, lookup).await?
            }
        };

        Ok(found.unwrap_or(MatchResult::NoMatch))
    }

    /// Step 1: exact match on the fingerprint tag.
    pub async fn by_fingerprint<L: TopicLookup>(
        &self,
        event: &CalendarEvent,
        lookup: &L,
    ) -> ForumResult<Option<MatchResult>> {
        let Some(fingerprint) = &event.fingerprint else {
            return Ok(None);
        };
        Ok(lookup
            .find_by_fingerprint_tag(fingerprint)
            .await?
            .map(MatchResult::Exact))
    }

    /// Step 2: search by time window and verify each candidate's key.
    pub async fn by_time_window<L: TopicLookup>(
        &self,
        event: &CalendarEvent,
        keys: &[TopicMatchKey],
        lookup: &L,
    ) -> ForumResult<Option<MatchResult>> {
        let candidates = lookup.find_by_time_window(event.start, event.end).await?;
        tracing::debug!(
            event = %event.label(),
            candidates = candidates.len(),
            "time-window search"
        );

        let matching: Vec<ExistingTopic> = candidates
            .into_iter()
            .filter(|topic| self.satisfies(topic, keys))
            .collect();

        Ok(prefer_most_recent(matching).map(|topic| MatchResult::Heuristic {
            topic,
            via: MatchSource::Search,
        }))
    }

    /// Step 3: walk the recent-topics listing, first verified topic wins.
    pub async fn by_recent_scan<L: TopicLookup>(
        &self,
        keys: &[TopicMatchKey],
        lookup: &L,
    ) -> ForumResult<Option<MatchResult>> {
        for page in 0..self.config.scan_pages.max(1) {
            let topics = lookup.list_recent_topics(page).await?;
            if topics.is_empty() {
                break;
            }
            if let Some(topic) = topics.into_iter().find(|t| self.satisfies(t, keys)) {
                tracing::debug!(topic_id = topic.topic_id, page, "recent scan matched");
                return Ok(Some(MatchResult::Heuristic {
                    topic,
                    via: MatchSource::Scan,
                }));
            }
        }
        Ok(None)
    }

    fn candidate_keys(&self, event: &CalendarEvent) -> Vec<TopicMatchKey> {
        let keys = TopicMatchKey::candidates_for_event(event, self.config.dedupe, self.site_tz());
        tracing::debug!(event = %event.label(), ?keys, "candidate match keys");
        keys
    }

    fn satisfies(&self, topic: &ExistingTopic, keys: &[TopicMatchKey]) -> bool {
        TopicMatchKey::for_topic(topic, self.mode(), self.site_tz())
            .is_some_and(|key| keys.contains(&key))
    }

    fn mode(&self) -> DedupeMode {
        self.config.dedupe
    }

    fn site_tz(&self) -> Tz {
        self.config.site_tz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Behavior, FakeForum, topic_at};
    use crate::fingerprint::Fingerprint;
    use chrono::{DateTime, Utc};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn event(uid: Option<&str>, location: Option<&str>) -> CalendarEvent {
        CalendarEvent {
            uid: uid.map(str::to_string),
            summary: "Seminar".to_string(),
            start: utc("2025-10-17T10:00:00Z"),
            end: utc("2025-10-17T11:00:00Z"),
            location: location.map(str::to_string),
            description: None,
            url: None,
            fingerprint: uid.and_then(Fingerprint::from_uid),
        }
    }

    const START: &str = "2025-10-17T10:00:00Z";
    const END: &str = "2025-10-17T11:00:00Z";

    #[tokio::test]
    async fn fingerprint_hit_is_exact_and_skips_search() {
        let forum = FakeForum::new();
        let ev = event(Some("abc123"), Some("Room A"));
        // different times and location: the tag alone decides
        let mut tagged = topic_at(5, "2024-01-01T09:00:00Z", "2024-01-01T10:00:00Z", Some("Elsewhere"));
        tagged.tags.push(ev.fingerprint.as_ref().unwrap().tag());
        forum.seed(tagged);

        let config = SyncConfig::default();
        let result = Matcher::new(&config).find(&ev, &forum).await.unwrap();

        assert!(matches!(result, MatchResult::Exact(ref t) if t.topic_id == 5));
        assert_eq!(forum.calls().window_searches, 0);
    }

    #[tokio::test]
    async fn event_without_uid_goes_straight_to_search() {
        let forum = FakeForum::new();
        forum.seed(topic_at(5, START, END, Some("Room A")));

        let config = SyncConfig::default();
        let result = Matcher::new(&config)
            .find(&event(None, Some("room a")), &forum)
            .await
            .unwrap();

        assert_eq!(forum.calls().tag_searches, 0);
        assert!(matches!(
            result,
            MatchResult::Heuristic { ref topic, via: MatchSource::Search } if topic.topic_id == 5
        ));
    }

    #[tokio::test]
    async fn strict_mode_rejects_different_location() {
        let forum = FakeForum::new();
        forum.seed(topic_at(5, START, END, Some("Room B")));

        let config = SyncConfig::default();
        let result = Matcher::new(&config)
            .find(&event(Some("new-uid"), Some("Room A")), &forum)
            .await
            .unwrap();

        assert_eq!(result, MatchResult::NoMatch);
    }

    #[tokio::test]
    async fn time_only_mode_ignores_location() {
        let forum = FakeForum::new();
        forum.seed(topic_at(5, START, END, Some("Room B")));

        let config = SyncConfig {
            dedupe: DedupeMode::TimeOnly,
            ..SyncConfig::default()
        };
        let result = Matcher::new(&config)
            .find(&event(Some("new-uid"), Some("Room A")), &forum)
            .await
            .unwrap();

        assert_eq!(result.topic().map(|t| t.topic_id), Some(5));
    }

    #[tokio::test]
    async fn overlapping_but_unequal_window_is_not_a_match() {
        let forum = FakeForum::new();
        forum.seed(topic_at(5, START, "2025-10-17T12:00:00Z", None));

        let config = SyncConfig::default();
        let result = Matcher::new(&config)
            .find(&event(None, None), &forum)
            .await
            .unwrap();

        assert_eq!(result, MatchResult::NoMatch);
    }

    // Heuristic policy, not a hard requirement: when several topics satisfy
    // the key, the most recently created one is chosen.
    #[tokio::test]
    async fn most_recent_candidate_wins_tie_break() {
        let forum = FakeForum::new();
        forum.seed(topic_at(5, START, END, None));
        forum.seed(topic_at(9, START, END, None));
        forum.seed(topic_at(7, START, END, None));

        let config = SyncConfig::default();
        let result = Matcher::new(&config)
            .find(&event(None, None), &forum)
            .await
            .unwrap();

        assert_eq!(result.topic().map(|t| t.topic_id), Some(9));
    }

    #[test]
    fn prefer_most_recent_breaks_equal_timestamps_by_id() {
        let a = topic_at(3, START, END, None);
        let mut b = topic_at(4, START, END, None);
        b.created_at = a.created_at;

        assert_eq!(prefer_most_recent(vec![b, a]).map(|t| t.topic_id), Some(4));
        assert_eq!(prefer_most_recent(Vec::new()), None);
    }

    #[tokio::test]
    async fn legacy_shifted_topic_is_recognized() {
        let forum = FakeForum::new();
        // written by tooling that read 11:00 local as UTC: shows 12:00-13:00 London
        forum.seed(topic_at(5, "2025-10-17T11:00:00Z", "2025-10-17T12:00:00Z", None));

        let config = SyncConfig::default();
        let result = Matcher::new(&config)
            .find(&event(None, None), &forum)
            .await
            .unwrap();

        assert_eq!(result.topic().map(|t| t.topic_id), Some(5));
        assert!(matches!(result, MatchResult::Heuristic { .. }));
    }

    #[tokio::test]
    async fn search_error_falls_back_to_scan() {
        let forum = FakeForum::with_behavior(Behavior {
            fail_window_search: true,
            ..Behavior::default()
        });
        // five topics, page size two: the match sits on page 1
        for id in [1, 2, 3, 4] {
            forum.seed(topic_at(id, "2024-03-01T10:00:00Z", "2024-03-01T11:00:00Z", None));
        }
        forum.seed(topic_at(0, START, END, None));
        forum.seed(topic_at(6, "2024-03-02T10:00:00Z", "2024-03-02T11:00:00Z", None));

        let config = SyncConfig::default();
        let result = Matcher::new(&config)
            .find(&event(None, None), &forum)
            .await
            .unwrap();

        assert!(matches!(
            result,
            MatchResult::Heuristic { ref topic, via: MatchSource::Scan } if topic.topic_id == 0
        ));
        // recency order 6,4 | 3,2 | 1,0 -> found on page 2, no further pages read
        assert_eq!(forum.calls().recent_pages, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn empty_search_never_scans() {
        let forum = FakeForum::new();
        forum.seed(topic_at(1, "2024-03-01T10:00:00Z", "2024-03-01T11:00:00Z", None));

        let config = SyncConfig::default();
        let result = Matcher::new(&config)
            .find(&event(Some("abc123"), None), &forum)
            .await
            .unwrap();

        assert_eq!(result, MatchResult::NoMatch);
        assert_eq!(forum.calls().window_searches, 1);
        assert!(forum.calls().recent_pages.is_empty());
    }

    #[tokio::test]
    async fn scan_respects_page_cap() {
        let forum = FakeForum::with_behavior(Behavior {
            fail_window_search: true,
            ..Behavior::default()
        });
        for id in 1..=10 {
            forum.seed(topic_at(id, "2024-03-01T10:00:00Z", "2024-03-01T11:00:00Z", None));
        }

        let config = SyncConfig {
            scan_pages: 3,
            ..SyncConfig::default()
        };
        let result = Matcher::new(&config)
            .find(&event(None, None), &forum)
            .await
            .unwrap();

        assert_eq!(result, MatchResult::NoMatch);
        assert_eq!(forum.calls().recent_pages, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn fingerprint_lookup_error_is_returned() {
        let forum = FakeForum::with_behavior(Behavior {
            fail_tag_search: true,
            ..Behavior::default()
        });

        let config = SyncConfig::default();
        let result = Matcher::new(&config)
            .find(&event(Some("abc123"), None), &forum)
            .await;

        assert!(result.is_err());
        assert_eq!(forum.calls().window_searches, 0);
    }
}
