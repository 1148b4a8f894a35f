//! Calendar event types.
//!
//! `RawEvent` is what the ICS parser yields: every field optional, times in
//! whatever representation the feed used. `normalize` turns it into a
//! `CalendarEvent` with UTC instants and a fingerprint, or rejects it.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::error::EventError;
use crate::fingerprint::Fingerprint;

pub const UNTITLED_EVENT: &str = "Untitled event";

/// A time as written in the feed, before any zone is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned {
        datetime: NaiveDateTime,
        tzid: String,
    },
}

impl EventTime {
    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Resolve to an instant. Floating times and dates are read in `site_tz`,
    /// as is a zoned time whose TZID chrono-tz does not know.
    pub fn to_utc(&self, site_tz: Tz) -> DateTime<Utc> {
        match self {
            EventTime::DateTimeUtc(dt) => *dt,
            EventTime::DateTimeFloating(naive) => localize(naive, site_tz),
            EventTime::Date(d) => localize(&d.and_time(chrono::NaiveTime::MIN), site_tz),
            EventTime::DateTimeZoned { datetime, tzid } => match tzid.parse::<Tz>() {
                Ok(tz) => localize(datetime, tz),
                Err(_) => {
                    tracing::warn!(tzid = %tzid, "unknown TZID, reading time in site timezone");
                    localize(datetime, site_tz)
                }
            },
        }
    }
}

/// Interpret a wall-clock time in `tz`. Ambiguous times take the earlier
/// instant; times inside a DST gap are read as if the clock had not moved.
pub fn localize(naive: &NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    tz.from_local_datetime(naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(naive))
        .with_timezone(&Utc)
}

/// One VEVENT as parsed from the feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    /// DURATION property, used when DTEND is absent
    pub duration: Option<Duration>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

/// A normalized calendar event. Built fresh each run and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub fingerprint: Option<Fingerprint>,
}

impl CalendarEvent {
    /// Short label for log lines.
    pub fn label(&self) -> String {
        match &self.uid {
            Some(uid) => format!("{} (UID={})", self.summary, uid),
            None => self.summary.clone(),
        }
    }
}

/// Normalize a parsed event, filling a missing end (or start) from the
/// event's DURATION or the configured default length.
pub fn normalize(raw: RawEvent, config: &SyncConfig) -> Result<CalendarEvent, EventError> {
    let summary = non_empty(raw.summary).unwrap_or_else(|| UNTITLED_EVENT.to_string());
    let label = raw.uid.clone().unwrap_or_else(|| summary.clone());

    let all_day = raw.start.as_ref().or(raw.end.as_ref()).is_some_and(EventTime::is_all_day);
    let default_length = if all_day {
        Duration::days(1)
    } else {
        config.default_duration
    };

    let start = raw.start.as_ref().map(|t| t.to_utc(config.site_tz));
    let end = raw.end.as_ref().map(|t| t.to_utc(config.site_tz));

    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (Some(start), Some(end)),
        (Some(start), None) => (
            Some(start),
            start.checked_add_signed(raw.duration.unwrap_or(default_length)),
        ),
        (None, Some(end)) => (end.checked_sub_signed(default_length), Some(end)),
        (None, None) => return Err(EventError::MissingTimes(label)),
    };
    let (Some(start), Some(end)) = (start, end) else {
        return Err(EventError::OutOfRange(label));
    };

    if end < start {
        return Err(EventError::EndBeforeStart(label));
    }

    let fingerprint = raw.uid.as_deref().and_then(Fingerprint::from_uid);

    Ok(CalendarEvent {
        uid: raw.uid,
        summary,
        start,
        end,
        location: non_empty(raw.location),
        description: non_empty(raw.description),
        url: non_empty(raw.url),
        fingerprint,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
