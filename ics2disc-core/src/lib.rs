//! Core types for ics2disc.
//!
//! This crate holds everything that decides *what* a sync run does:
//! - `event` and `ics` turn an iCalendar feed into normalized `CalendarEvent`s
//! - `fingerprint` and `match_key` identify which forum topic represents an event
//! - `matcher` and `reconcile` pick and perform create / update / adopt
//! - `run_guard` keeps two runs on the same host from overlapping
//!
//! The forum itself is reached through the `forum::ForumApi` trait, which the
//! provider crates implement.

pub mod backoff;
pub mod config;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod forum;
pub mod ics;
pub mod ledger;
pub mod match_key;
pub mod matcher;
pub mod reconcile;
pub mod render;
pub mod run_guard;
pub mod sync;

#[cfg(test)]
pub(crate) mod fake;

pub use config::{DedupeMode, SyncConfig};
pub use error::{EventError, ForumError, ForumResult, IcsError};
pub use event::{CalendarEvent, EventTime, RawEvent};
pub use fingerprint::Fingerprint;
pub use forum::{BumpSuppression, ExistingTopic, ForumApi, NewTopic, TopicLookup};
pub use run_guard::{Acquire, RunGuard};
pub use sync::{Decision, PlannedEvent, SyncStats, plan_events, sync_events};
