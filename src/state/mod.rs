//! State module for tracking crawl progress
//!
//! This module defines the durable snapshot of a run and its parts.
//!
//! # Components
//!
//! - `CrawlState`: The checkpointed run state (cursor, counters, dedup index, failures)
//! - `ProgressCursor`: Current page, item index and page totals
//! - `RunStatistics`: Monotonic run counters
//! - `DedupIndex`: Set of ids collected so far

mod crawl_state;
mod dedup;
mod progress;

// Re-export main types
pub use crawl_state::{CrawlState, ItemDisposition};
pub use dedup::DedupIndex;
pub use progress::{FailedItem, ProgressCursor, RunStatistics};
