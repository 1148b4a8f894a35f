//! First-post bodies.
//!
//! Topics carry a discourse-calendar `[event ...]` block. We render it from a
//! `CalendarEvent` and read it back from existing topics to compare times
//! and locations.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::event::{CalendarEvent, localize};
use crate::fingerprint::{Fingerprint, strip_markers};

/// Wall-clock format used by `[event start=".." end=".."]`.
pub const BLOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

static EVENT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\[event\s+([^\]]+)\]").unwrap());

static ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([a-zA-Z0-9_-]+)\s*=\s*"([^"]*)""#).unwrap());

/// Format an instant as block wall-clock time in `tz`.
pub fn block_time(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format(BLOCK_TIME_FORMAT).to_string()
}

/// Attribute values cannot contain quotes or brackets.
fn attr_value(s: &str) -> String {
    s.replace('"', "'")
        .replace('[', "(")
        .replace(']', ")")
        .replace(['\r', '\n'], " ")
}

/// Render the `[event]` block (without marker).
pub fn render_event_block(event: &CalendarEvent, site_tz: Tz) -> String {
    let mut open = format!(
        r#"[event start="{}" end="{}" status="public" name="{}""#,
        block_time(event.start, site_tz),
        block_time(event.end, site_tz),
        attr_value(&event.summary),
    );
    if let Some(location) = &event.location {
        open.push_str(&format!(r#" location="{}""#, attr_value(location)));
    }
    open.push_str(&format!(r#" timezone="{}"]"#, site_tz.name()));

    let mut lines = vec![open];
    if let Some(location) = &event.location {
        lines.push(format!("**Location:** {location}"));
    }
    if let Some(url) = &event.url {
        lines.push(format!("**Link:** {url}"));
    }
    if let Some(description) = &event.description {
        lines.push(String::new());
        lines.push(description.clone());
    }
    lines.push("[/event]".to_string());

    lines.join("\n")
}

/// Full first-post body: hidden marker (when the event has a fingerprint)
/// followed by the event block.
pub fn render_body(event: &CalendarEvent, site_tz: Tz) -> String {
    let block = render_event_block(event, site_tz);
    match &event.fingerprint {
        Some(fp) => format!("{}\n", fp.write_marker(&block)),
        None => format!("{block}\n"),
    }
}

/// Bodies are equivalent when they differ only by hidden markers and
/// surrounding whitespace.
pub fn bodies_equivalent(a: &str, b: &str) -> bool {
    strip_markers(a).trim() == strip_markers(b).trim()
}

/// Does `body` need rewriting for `fingerprint`: either the visible content
/// changed or the hidden marker is missing / stale?
pub fn needs_rewrite(current: &str, rendered: &str, fingerprint: Option<&Fingerprint>) -> bool {
    if !bodies_equivalent(current, rendered) {
        return true;
    }
    fingerprint.is_some_and(|fp| {
        fp.read_marker(current) != crate::fingerprint::MarkerPresence::Matches
    })
}

/// Attributes of the first `[event ...]` block in a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBlock {
    attrs: HashMap<String, String>,
}

impl EventBlock {
    pub fn parse(body: &str) -> Option<Self> {
        let inner = EVENT_TAG_RE.captures(body)?;
        let attrs: HashMap<String, String> = ATTR_RE
            .captures_iter(&inner[1])
            .map(|c| (c[1].to_lowercase(), c[2].to_string()))
            .collect();
        Some(EventBlock { attrs })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Zone the block's times are written in: its `timezone` attribute, or
    /// `fallback` when absent or unknown.
    pub fn timezone(&self, fallback: Tz) -> Tz {
        self.attr("timezone")
            .and_then(|name| name.trim().parse::<Tz>().ok())
            .unwrap_or(fallback)
    }

    pub fn start(&self, fallback: Tz) -> Option<DateTime<Utc>> {
        self.time("start", fallback)
    }

    pub fn end(&self, fallback: Tz) -> Option<DateTime<Utc>> {
        self.time("end", fallback)
    }

    pub fn location(&self) -> Option<&str> {
        self.attr("location")
    }

    fn time(&self, key: &str, fallback: Tz) -> Option<DateTime<Utc>> {
        let raw = self.attr(key)?.trim();
        let naive = NaiveDateTime::parse_from_str(raw, BLOCK_TIME_FORMAT).ok()?;
        Some(localize(&naive, self.timezone(fallback)))
    }
}
