//! Discourse provider for ics2disc.
//!
//! `DiscourseClient` implements the core's `TopicLookup` and `ForumApi`
//! against the Discourse REST API and the discourse-calendar plugin's
//! event listing.

mod api;
mod client;
mod types;

pub use client::{DEFAULT_API_USERNAME, DEFAULT_TIMEOUT, DiscourseClient, DiscourseConfig};
