/// Retry policy definitions
///
/// Exponential backoff with a cap and multiplicative jitter, plus the
/// classification that decides whether a failure is worth retrying at all.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Largest exponent used when computing backoff; keeps the product finite
const MAX_BACKOFF_EXPONENT: u32 = 62;

/// Classification attached to every fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Expected to resolve with time (timeouts, connection resets, 5xx)
    Transient,

    /// Will not resolve by repeating the same request (404, malformed content)
    Permanent,

    /// The fetch session itself is unusable; nothing further can succeed
    Fatal,
}

impl ErrorKind {
    /// Returns true if this failure may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this failure must stop the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Backoff before jitter: `min(base_delay * 2^attempt, max_delay)`
///
/// `attempt` is zero-based: the wait after the first failed attempt uses 0.
pub fn unjittered_delay(attempt: u32, base_delay: f64, max_delay: f64) -> f64 {
    let exponent = attempt.min(MAX_BACKOFF_EXPONENT) as i32;
    (base_delay * 2f64.powi(exponent)).min(max_delay)
}

/// Backoff in seconds with a uniform jitter factor in `[0.5, 1.5)`
pub fn next_delay(attempt: u32, base_delay: f64, max_delay: f64) -> f64 {
    let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
    unjittered_delay(attempt, base_delay, max_delay) * jitter
}

/// Whether another attempt is allowed
///
/// `attempt` is the number of attempts already made. Only transient failures
/// are retried, so an item that keeps failing transiently is attempted exactly
/// `max_retries` times.
pub fn should_retry(kind: ErrorKind, attempt: u32, max_retries: u32) -> bool {
    kind.is_transient() && attempt < max_retries
}

/// Retry bound and backoff parameters for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per operation
    pub max_retries: u32,

    /// Base backoff in seconds
    pub base_delay: f64,

    /// Backoff cap in seconds (applied before jitter)
    pub max_delay: f64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: f64, max_delay: f64) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        should_retry(kind, attempt, self.max_retries)
    }

    /// Jittered wait before the retry following zero-based `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = next_delay(attempt, self.base_delay, self.max_delay);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 2.0, 60.0)
    }
}
