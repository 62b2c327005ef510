//! Run outcome and final report

use crate::state::{FailedItem, ProgressCursor, RunStatistics};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Why a run stopped before completing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A listing page could not be read after retries, or failed for good
    ListingUnreadable { page: u32, error: String },

    /// A detail fetch reported a fatal error
    DetailFatal { id: String, error: String },

    /// Too many consecutive checkpoints failed
    PersistenceExhausted { failures: u32, error: String },

    /// The stop signal fired
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListingUnreadable { page, error } => {
                write!(f, "listing page {} unreadable: {}", page, error)
            }
            Self::DetailFatal { id, error } => write!(f, "fatal error on {}: {}", id, error),
            Self::PersistenceExhausted { failures, error } => write!(
                f,
                "{} consecutive checkpoint failures, last: {}",
                failures, error
            ),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every page was processed, or a page/item limit was reached
    Completed,

    /// The stored run had already completed; nothing was fetched
    AlreadyCompleted,

    /// The run stopped early and can be resumed
    Aborted { reason: AbortReason },
}

impl RunOutcome {
    /// Returns true if the run's state is completed
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed | Self::AlreadyCompleted)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::AlreadyCompleted => write!(f, "already completed"),
            Self::Aborted { reason } => write!(f, "aborted ({})", reason),
        }
    }
}

/// Summary of one call to `Coordinator::run`
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub run_id: String,
    pub outcome: RunOutcome,

    /// Statistics of the whole run, including earlier sessions
    pub statistics: RunStatistics,

    /// Cursor at the end of this session
    pub progress: ProgressCursor,

    /// Every failed item of the run
    pub failed_items: Vec<FailedItem>,

    /// Records collected during this session only
    pub new_records: u64,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Wall time of this session
    pub elapsed: Duration,
}
