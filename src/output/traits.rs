//! Output traits and error types
//!
//! This module defines how collected records leave the crawler:
//! - `ItemObserver`: called by the orchestrator for every collected record
//! - `RecordSink`: a durable destination for records

use crate::scrape::DetailRecord;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receives each collected record, in collection order
///
/// Observer errors are logged by the orchestrator and never stop the crawl.
pub trait ItemObserver {
    /// Called once per newly collected record
    fn on_item_collected(&mut self, record: &DetailRecord) -> OutputResult<()>;

    /// Called once when the run reaches a terminal phase
    fn on_run_finished(&mut self) -> OutputResult<()> {
        Ok(())
    }
}

impl<F> ItemObserver for F
where
    F: FnMut(&DetailRecord) -> OutputResult<()>,
{
    fn on_item_collected(&mut self, record: &DetailRecord) -> OutputResult<()> {
        self(record)
    }
}

/// A durable destination for collected records
pub trait RecordSink {
    /// Writes one record
    ///
    /// Writing the same record id twice must not produce two records where
    /// the format allows it (e.g. an upsert).
    fn write(&mut self, record: &DetailRecord) -> OutputResult<()>;

    /// Flushes buffered records to durable storage
    fn flush(&mut self) -> OutputResult<()>;
}

/// Adapts a `RecordSink` into an `ItemObserver`
#[derive(Debug)]
pub struct SinkObserver<S> {
    sink: S,
}

impl<S: RecordSink> SinkObserver<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn into_inner(self) -> S {
        self.sink
    }
}

impl<S: RecordSink> ItemObserver for SinkObserver<S> {
    fn on_item_collected(&mut self, record: &DetailRecord) -> OutputResult<()> {
        self.sink.write(record)
    }

    fn on_run_finished(&mut self) -> OutputResult<()> {
        self.sink.flush()
    }
}
