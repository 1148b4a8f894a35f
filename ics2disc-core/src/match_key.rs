//! Heuristic identity of an event occurrence: its time window and,
//! in strict mode, its location.

use chrono::{DateTime, Duration, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::config::DedupeMode;
use crate::event::CalendarEvent;
use crate::forum::ExistingTopic;
use crate::render::EventBlock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicMatchKey {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Normalized location; `None` in time-only mode.
    pub location: Option<String>,
}

impl TopicMatchKey {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        location: Option<&str>,
        mode: DedupeMode,
    ) -> Self {
        let location = match mode {
            DedupeMode::Strict => Some(normalize_location(location.unwrap_or_default())),
            DedupeMode::TimeOnly => None,
        };
        TopicMatchKey {
            start: to_minute(start),
            end: to_minute(end),
            location,
        }
    }

    pub fn for_event(event: &CalendarEvent, mode: DedupeMode) -> Self {
        Self::new(event.start, event.end, event.location.as_deref(), mode)
    }

    /// Keys an existing topic for `event` could carry. Besides the event's own
    /// key this includes the shapes written by older tooling that read floating
    /// times as UTC before converting to the site zone, which shifts the stored
    /// wall-clock time by the site's UTC offset.
    pub fn candidates_for_event(event: &CalendarEvent, mode: DedupeMode, site_tz: Tz) -> Vec<Self> {
        let exact = Self::for_event(event, mode);
        let start_shift = utc_offset(event.start, site_tz);
        let end_shift = utc_offset(event.end, site_tz);

        let mut keys = vec![exact.clone()];
        let variants = [
            (start_shift, Duration::zero()),
            (Duration::zero(), end_shift),
            (start_shift, end_shift),
        ];
        for (ds, de) in variants {
            if ds.is_zero() && de.is_zero() {
                continue;
            }
            let key = TopicMatchKey {
                start: exact.start + ds,
                end: exact.end + de,
                location: exact.location.clone(),
            };
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Key of an existing topic, read from the `[event]` block of its body.
    /// `None` when the topic has no parsable block.
    pub fn for_topic(topic: &ExistingTopic, mode: DedupeMode, site_tz: Tz) -> Option<Self> {
        let block = EventBlock::parse(&topic.body)?;
        let start = block.start(site_tz)?;
        let end = block.end(site_tz)?;
        Some(Self::new(start, end, block.location(), mode))
    }
}

/// Lowercase, collapse inner whitespace, and drop repeated comma-separated
/// parts, so "UP Physics C05,up physics  c05" equals "up physics c05".
pub fn normalize_location(s: &str) -> String {
    let lowered = s.to_lowercase();
    let mut parts: Vec<String> = Vec::new();
    for part in lowered.split(',') {
        let part = part.split_whitespace().collect::<Vec<_>>().join(" ");
        if !part.is_empty() && !parts.contains(&part) {
            parts.push(part);
        }
    }
    parts.join(", ")
}

fn to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

fn utc_offset(at: DateTime<Utc>, tz: Tz) -> Duration {
    let seconds = tz.offset_from_utc_datetime(&at.naive_utc()).fix().local_minus_utc();
    Duration::seconds(i64::from(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn event(location: Option<&str>) -> CalendarEvent {
        CalendarEvent {
            uid: None,
            summary: "Seminar".to_string(),
            start: utc("2025-10-17T10:00:00Z"),
            end: utc("2025-10-17T11:00:00Z"),
            location: location.map(str::to_string),
            description: None,
            url: None,
            fingerprint: None,
        }
    }

    #[test]
    fn location_normalization_tolerates_case_whitespace_and_repeats() {
        assert_eq!(
            normalize_location("UP Physics C05,up physics  c05 "),
            "up physics c05"
        );
        assert_eq!(normalize_location(" Room A , Building 2"), "room a, building 2");
        assert_eq!(normalize_location(""), "");
    }

    #[test]
    fn strict_keys_compare_location() {
        let a = TopicMatchKey::for_event(&event(Some("Room A ")), DedupeMode::Strict);
        let b = TopicMatchKey::for_event(&event(Some("room a")), DedupeMode::Strict);
        let c = TopicMatchKey::for_event(&event(Some("Room B")), DedupeMode::Strict);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn time_only_keys_ignore_location() {
        let a = TopicMatchKey::for_event(&event(Some("Room A")), DedupeMode::TimeOnly);
        let c = TopicMatchKey::for_event(&event(Some("Room B")), DedupeMode::TimeOnly);

        assert_eq!(a, c);
    }

    #[test]
    fn seconds_are_ignored() {
        let mut e = event(None);
        e.start = utc("2025-10-17T10:00:42Z");

        assert_eq!(
            TopicMatchKey::for_event(&e, DedupeMode::Strict),
            TopicMatchKey::for_event(&event(None), DedupeMode::Strict)
        );
    }

    #[test]
    fn legacy_shifted_variants_follow_the_site_offset() {
        let keys = TopicMatchKey::candidates_for_event(
            &event(None),
            DedupeMode::TimeOnly,
            chrono_tz::Europe::London,
        );

        // BST is UTC+1 in October
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&TopicMatchKey {
            start: utc("2025-10-17T11:00:00Z"),
            end: utc("2025-10-17T12:00:00Z"),
            location: None,
        }));
    }

    #[test]
    fn no_legacy_variants_when_site_is_utc() {
        let keys =
            TopicMatchKey::candidates_for_event(&event(None), DedupeMode::Strict, chrono_tz::UTC);
        assert_eq!(keys.len(), 1);
    }
}
