//! iCalendar feed parsing.
//!
//! Only the VEVENT properties a forum topic needs are read; recurrence rules
//! are not expanded.

mod parse;

pub use parse::parse_events;
