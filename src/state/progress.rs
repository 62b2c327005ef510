//! Pagination cursor and run counters
//!
//! These are the small value types aggregated by `CrawlState`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position of the crawl within the paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCursor {
    /// Listing page currently being processed (1-based)
    pub current_page: u32,

    /// Index of the next unprocessed item on `current_page`
    pub current_index: u32,

    /// Total listing pages, when the site reports it
    pub total_pages: Option<u32>,

    /// Last listing page whose items were all processed (0 = none)
    pub last_completed_page: u32,
}

impl ProgressCursor {
    pub fn new() -> Self {
        Self {
            current_page: 1,
            current_index: 0,
            total_pages: None,
            last_completed_page: 0,
        }
    }

    /// Moves to the next page, marking the current one complete
    pub fn advance_page(&mut self) {
        self.last_completed_page = self.current_page;
        self.current_page += 1;
        self.current_index = 0;
    }

    /// Returns true if the cursor is internally consistent for a live run
    pub fn is_consistent(&self) -> bool {
        self.current_page >= 1 && self.last_completed_page < self.current_page
    }
}

impl Default for ProgressCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Run counters; never decrease within a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Detail records collected
    pub total_collected: u64,

    /// Items and listing pages that failed for good
    pub errors: u64,

    /// Extra attempts made after a transient failure
    pub retries: u64,

    /// Listing items skipped because their id was already collected
    pub skipped_duplicates: u64,
}

impl RunStatistics {
    /// Share of finished items that were collected, in percent
    pub fn success_rate(&self) -> f64 {
        let total = self.total_collected + self.errors;
        if total == 0 {
            return 100.0;
        }
        (self.total_collected as f64 / total as f64) * 100.0
    }

    /// Returns true if no counter in `self` is below its value in `earlier`
    pub fn dominates(&self, earlier: &RunStatistics) -> bool {
        self.total_collected >= earlier.total_collected
            && self.errors >= earlier.errors
            && self.retries >= earlier.retries
            && self.skipped_duplicates >= earlier.skipped_duplicates
    }
}

/// Audit record for an item that could not be collected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Identifying information (id, title, url) for manual follow-up
    pub info: BTreeMap<String, String>,

    /// Summary of the last error
    pub error: String,

    /// Attempts made before giving up
    pub attempts: u32,
}
