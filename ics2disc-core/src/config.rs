//! Immutable per-run settings shared by the matcher and reconciler.

use chrono::Duration;
use chrono_tz::Tz;

pub const DEFAULT_SITE_TZ: Tz = chrono_tz::Europe::London;
pub const DEFAULT_SCAN_PAGES: u32 = 8;
pub const DEFAULT_EVENT_MINUTES: i64 = 60;

/// How strictly a heuristic match compares an event with an existing topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupeMode {
    /// Start, end and normalized location must all agree.
    #[default]
    Strict,
    /// Start and end must agree; location is ignored.
    TimeOnly,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Zone used to render times and to read floating / all-day times.
    pub site_tz: Tz,
    /// Category for newly created topics. Updates never move a topic.
    pub category_id: Option<u64>,
    /// Tags added to every created topic (default tags plus static tags).
    pub tags: Vec<String>,
    /// How many /latest pages the scan fallback may read.
    pub scan_pages: u32,
    pub dedupe: DedupeMode,
    /// Length given to events that carry a start but no end.
    pub default_duration: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            site_tz: DEFAULT_SITE_TZ,
            category_id: None,
            tags: Vec::new(),
            scan_pages: DEFAULT_SCAN_PAGES,
            dedupe: DedupeMode::Strict,
            default_duration: Duration::minutes(DEFAULT_EVENT_MINUTES),
        }
    }
}

impl SyncConfig {
    /// Merge tag lists, dropping blanks and duplicates while keeping first-seen order.
    pub fn merge_tags<'a>(lists: impl IntoIterator<Item = &'a [String]>) -> Vec<String> {
        let mut merged: Vec<String> = Vec::new();
        for tag in lists.into_iter().flatten() {
            let tag = tag.trim();
            if !tag.is_empty() && !merged.iter().any(|t| t == tag) {
                merged.push(tag.to_string());
            }
        }
        merged
    }
}
