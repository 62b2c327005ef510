//! Output module for collected records and run reports
//!
//! This module handles:
//! - Writing collected records to JSON Lines, CSV or SQLite
//! - Observing the orchestrator for newly collected records
//! - Printing final run reports and stored run summaries

mod csv_sink;
mod jsonl;
pub mod report;
mod sqlite;
mod traits;

pub use csv_sink::CsvSink;
pub use jsonl::JsonLinesSink;
pub use report::{format_report, format_state_summary, print_report, print_state_summary};
pub use sqlite::SqliteSink;
pub use traits::{ItemObserver, OutputError, OutputResult, RecordSink, SinkObserver};
