//! Error types for ics2disc.

use thiserror::Error;

/// Errors raised by a forum provider.
#[derive(Error, Debug)]
pub enum ForumError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Forum returned {status} for {path}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied for {0} (staff credentials required)")]
    PermissionDenied(String),

    #[error("Forum request timed out after {0}s")]
    Timeout(u64),

    #[error("Failed to decode forum response: {0}")]
    Decode(String),

    #[error("No category configured for topic creation")]
    MissingCategory,
}

impl ForumError {
    /// True when the forum refused the call because the API user lacks rights.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ForumError::PermissionDenied(_))
    }
}

/// Result type alias for forum operations.
pub type ForumResult<T> = Result<T, ForumError>;

/// Reasons a parsed calendar entry cannot become a `CalendarEvent`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Event '{0}' has neither a start nor an end time")]
    MissingTimes(String),

    #[error("Event '{0}' ends before it starts")]
    EndBeforeStart(String),

    #[error("Event '{0}' has a time outside the supported range")]
    OutOfRange(String),
}

#[derive(Error, Debug)]
pub enum IcsError {
    #[error("ICS parse error: {0}")]
    Parse(String),
}
