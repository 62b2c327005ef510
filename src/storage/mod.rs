//! Storage module for persisting crawl state
//!
//! This module handles durable checkpoints for the crawler, including:
//! - The `StateStore` trait and its JSON file implementation
//! - Atomic saves with a backup of the previous checkpoint
//! - Resume logic deciding between a stored and a fresh run

mod json_store;
mod traits;

pub use json_store::JsonStateStore;
pub use traits::{StateStore, StorageError, StorageResult};

use crate::state::CrawlState;
use tracing::info;

/// How a run starts, as decided by `initialize`
#[derive(Debug, Clone, PartialEq)]
pub enum StartingPoint {
    /// An interrupted run continues from its last checkpoint
    Resumed(CrawlState),

    /// The stored run already finished; nothing is left to do
    AlreadyCompleted(CrawlState),

    /// A new run starting at page 1
    Fresh(CrawlState),
}

impl StartingPoint {
    /// The state the run starts with
    pub fn state(&self) -> &CrawlState {
        match self {
            Self::Resumed(state) | Self::AlreadyCompleted(state) | Self::Fresh(state) => state,
        }
    }

    pub fn into_state(self) -> CrawlState {
        match self {
            Self::Resumed(state) | Self::AlreadyCompleted(state) | Self::Fresh(state) => state,
        }
    }
}

/// Decides where a run starts
///
/// # Arguments
///
/// * `store` - State backend to consult
/// * `run_id` - Run to start or resume
/// * `resume` - Whether a stored state may be reused
///
/// # Returns
///
/// * `Ok(StartingPoint::Resumed)` - Stored, incomplete state; marked running again
/// * `Ok(StartingPoint::AlreadyCompleted)` - Stored state that already completed
/// * `Ok(StartingPoint::Fresh)` - New state (no stored state, or `resume` is false)
/// * `Err(StorageError)` - A stored state exists but cannot be read
pub fn initialize<S: StateStore + ?Sized>(
    store: &S,
    run_id: &str,
    resume: bool,
) -> StorageResult<StartingPoint> {
    if resume {
        if let Some(mut stored) = store.load(run_id)? {
            if stored.is_completed {
                info!("Run {} already completed", run_id);
                return Ok(StartingPoint::AlreadyCompleted(stored));
            }

            info!(
                "Resuming run {} at page {}, item {} ({} collected)",
                run_id,
                stored.progress.current_page,
                stored.progress.current_index,
                stored.statistics.total_collected
            );
            stored.is_running = true;
            return Ok(StartingPoint::Resumed(stored));
        }
    }

    info!("Starting new run {}", run_id);
    Ok(StartingPoint::Fresh(CrawlState::new(run_id)))
}
