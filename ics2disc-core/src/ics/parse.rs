//! ICS feed parsing using the icalendar crate's parser.

use icalendar::{
    DatePerhapsTime,
    parser::{Component, read_calendar, unfold},
};

use crate::error::IcsError;
use crate::event::{EventTime, RawEvent};

/// Parse every VEVENT in a feed, in feed order.
///
/// A blank feed yields no events. Content the parser cannot read at all is
/// an error; individual events with unreadable times come back with those
/// fields unset and are rejected later by `event::normalize`.
pub fn parse_events(content: &str) -> Result<Vec<RawEvent>, IcsError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| IcsError::Parse(e.to_string()))?;

    let mut events = Vec::new();
    collect_vevents(&calendar.components, &mut events);
    Ok(events)
}

fn collect_vevents(components: &[Component<'_>], out: &mut Vec<RawEvent>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(parse_vevent(component));
        } else {
            collect_vevents(&component.components, out);
        }
    }
}

fn parse_vevent(vevent: &Component<'_>) -> RawEvent {
    let text = |name: &str| vevent.find_prop(name).map(|p| unescape(p.val.as_ref()));
    let time = |name: &str| {
        vevent
            .find_prop(name)
            .and_then(|p| DatePerhapsTime::try_from(p).ok())
            .map(to_event_time)
    };

    RawEvent {
        uid: vevent.find_prop("UID").map(|p| p.val.to_string()),
        summary: text("SUMMARY"),
        start: time("DTSTART"),
        end: time("DTEND"),
        duration: vevent
            .find_prop("DURATION")
            .and_then(|p| parse_duration(p.val.as_ref())),
        location: text("LOCATION"),
        description: text("DESCRIPTION"),
        url: text("URL"),
    }
}

/// Convert icalendar's DatePerhapsTime to our EventTime, preserving timezone info
fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            icalendar::CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                EventTime::DateTimeZoned {
                    datetime: date_time,
                    tzid,
                }
            }
        },
    }
}

/// Parse a DURATION value (PT1H30M, P1D, ...). Negative durations are ignored.
fn parse_duration(value: &str) -> Option<chrono::Duration> {
    let value = value.trim();
    if value.starts_with('-') {
        return None;
    }
    let duration = iso8601::duration(value.trim_start_matches('+')).ok()?;
    let std_duration: std::time::Duration = duration.into();
    chrono::Duration::from_std(std_duration).ok()
}

/// Undo RFC 5545 TEXT escaping.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
