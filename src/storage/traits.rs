//! Storage traits and error types
//!
//! This module defines the trait interface for state backends and
//! associated error types.

use crate::state::CrawlState;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt state file {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for crawl state backends
///
/// A store holds at most one state per run id. `save` must be atomic: a crash
/// at any point leaves either the previous or the new state loadable, never a
/// torn file.
pub trait StateStore {
    /// Loads the state for `run_id`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(state))` - A stored state was found and is consistent
    /// * `Ok(None)` - Nothing has been stored for this run
    /// * `Err(StorageError)` - A state exists but cannot be read
    fn load(&self, run_id: &str) -> StorageResult<Option<CrawlState>>;

    /// Durably replaces the stored state for `state.run_id`
    fn save(&mut self, state: &CrawlState) -> StorageResult<()>;

    /// Returns the most recently updated run that has not completed
    fn latest_incomplete_run(&self) -> StorageResult<Option<String>>;

    /// Deletes everything stored for `run_id`
    fn remove(&mut self, run_id: &str) -> StorageResult<()>;
}
