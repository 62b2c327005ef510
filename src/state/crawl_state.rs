//! Durable snapshot of a crawl run
//!
//! `CrawlState` is the unit that gets checkpointed. Every mutator stamps
//! `last_updated_at`, and once a run is completed all mutators refuse with
//! `CrawlError::RunCompleted`.

use crate::state::dedup::DedupIndex;
use crate::state::progress::{FailedItem, ProgressCursor, RunStatistics};
use crate::{CrawlError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What `record_item` did with an id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDisposition {
    /// The id was new and has been added to the dedup index
    Collected,

    /// The id was already collected; counted as a skipped duplicate
    Duplicate,
}

/// Complete persisted state of one crawl run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlState {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub is_running: bool,
    pub is_completed: bool,
    pub progress: ProgressCursor,
    pub statistics: RunStatistics,
    pub collected_ids: DedupIndex,
    pub failed_items: Vec<FailedItem>,
}

impl CrawlState {
    /// Creates a fresh running state positioned at page 1, index 0
    pub fn new(run_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            started_at: now,
            last_updated_at: now,
            is_running: true,
            is_completed: false,
            progress: ProgressCursor::new(),
            statistics: RunStatistics::default(),
            collected_ids: DedupIndex::new(),
            failed_items: Vec::new(),
        }
    }

    /// Returns true if `id` has already been collected
    pub fn is_collected(&self, id: &str) -> bool {
        self.collected_ids.contains(id)
    }

    /// Marks the current page complete and moves the cursor to the next one
    pub fn advance_page(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        self.progress.advance_page();
        self.touch();
        Ok(())
    }

    /// Records that the item with `id` was seen
    ///
    /// New ids are added to the dedup index and counted as collected. Known
    /// ids only bump the duplicate counter, so recording twice is harmless.
    pub fn record_item(&mut self, id: &str) -> Result<ItemDisposition> {
        self.ensure_mutable()?;
        let disposition = if self.collected_ids.insert(id) {
            self.statistics.total_collected += 1;
            ItemDisposition::Collected
        } else {
            self.statistics.skipped_duplicates += 1;
            ItemDisposition::Duplicate
        };
        self.touch();
        Ok(disposition)
    }

    /// Records an item that could not be collected
    ///
    /// # Arguments
    ///
    /// * `info` - Identifying fields of the listing item
    /// * `error` - Summary of the last error
    /// * `attempts` - Number of attempts made
    pub fn record_failure(
        &mut self,
        info: BTreeMap<String, String>,
        error: impl Into<String>,
        attempts: u32,
    ) -> Result<()> {
        self.ensure_mutable()?;
        self.failed_items.push(FailedItem {
            info,
            error: error.into(),
            attempts,
        });
        self.statistics.errors += 1;
        self.touch();
        Ok(())
    }

    /// Counts a failure that did not concern a single item (e.g. a listing page)
    pub fn record_error(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        self.statistics.errors += 1;
        self.touch();
        Ok(())
    }

    /// Adds `count` retries to the statistics
    pub fn record_retry(&mut self, count: u32) -> Result<()> {
        self.ensure_mutable()?;
        self.statistics.retries += u64::from(count);
        self.touch();
        Ok(())
    }

    /// Sets the index of the next unprocessed item on the current page
    pub fn set_item_index(&mut self, index: u32) -> Result<()> {
        self.ensure_mutable()?;
        self.progress.current_index = index;
        self.touch();
        Ok(())
    }

    /// Records the total page count reported by the listing
    pub fn set_total_pages(&mut self, total: u32) -> Result<()> {
        self.ensure_mutable()?;
        self.progress.total_pages = Some(total);
        self.touch();
        Ok(())
    }

    /// Marks the run completed. Terminal: no mutation is accepted afterwards.
    pub fn mark_completed(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        self.is_completed = true;
        self.is_running = false;
        self.touch();
        Ok(())
    }

    /// Marks the run as no longer running without completing it
    ///
    /// Used when a run aborts or is cancelled; the run stays resumable.
    pub fn mark_stopped(&mut self) {
        if self.is_running {
            self.is_running = false;
            self.touch();
        }
    }

    /// Marks a loaded, incomplete run as running again
    pub fn mark_resumed(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        self.is_running = true;
        self.touch();
        Ok(())
    }

    /// Checks the invariants a loaded state must satisfy
    ///
    /// Returns a description of the first violation found.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        if self.run_id.is_empty() {
            return Err("run_id is empty".to_string());
        }
        if self.progress.current_page < 1 {
            return Err("current_page must be >= 1".to_string());
        }
        if !self.is_completed && !self.progress.is_consistent() {
            return Err(format!(
                "last_completed_page ({}) must be below current_page ({})",
                self.progress.last_completed_page, self.progress.current_page
            ));
        }
        if self.is_completed && self.is_running {
            return Err("a completed run cannot be running".to_string());
        }
        if (self.collected_ids.len() as u64) > self.statistics.total_collected {
            return Err(format!(
                "collected_ids ({}) exceeds total_collected ({})",
                self.collected_ids.len(),
                self.statistics.total_collected
            ));
        }
        if self.last_updated_at < self.started_at {
            return Err("last_updated_at precedes started_at".to_string());
        }
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_completed {
            return Err(CrawlError::RunCompleted {
                run_id: self.run_id.clone(),
            });
        }
        Ok(())
    }

    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_updated_at {
            self.last_updated_at = now;
        }
    }
}
