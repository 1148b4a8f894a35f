//! Retry schedule for forum and feed requests.

use std::time::Duration;

/// Exponential backoff with jitter: 1s, 2s, 4s, ... capped at 30s, six
/// attempts in total. A server-supplied `Retry-After` replaces the computed
/// delay for that attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
    /// Upper bound of the random extra wait added to each delay
    pub jitter: Duration,
    /// Pause after every successful request
    pub courtesy_pause: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            attempts: 6,
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: Duration::from_millis(500),
            courtesy_pause: Duration::from_millis(200),
        }
    }
}

impl Backoff {
    /// Same attempt count, no waiting. For tests.
    pub fn immediate() -> Self {
        Backoff {
            initial: Duration::ZERO,
            max: Duration::ZERO,
            jitter: Duration::ZERO,
            courtesy_pause: Duration::ZERO,
            ..Backoff::default()
        }
    }

    /// Wait before retrying after failed attempt number `attempt` (0-based).
    /// Never longer than `max` plus jitter, whatever the server asked for.
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = retry_after.unwrap_or_else(|| {
            let factor = 2u32.saturating_pow(attempt.min(16));
            self.initial.saturating_mul(factor)
        });
        base.min(self.max) + self.jitter_sample()
    }

    fn jitter_sample(&self) -> Duration {
        let millis = self.jitter.as_millis() as u64;
        if millis == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(fastrand::u64(0..=millis))
    }
}

/// 429 and 5xx are worth retrying; everything else is final.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// `Retry-After` in its delay-seconds form. HTTP dates are not honored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}
