//! Bid-Crawler: a resumable crawler for paginated bid-notice listings
//!
//! This crate walks a paginated listing site page by page, follows each
//! listing item to its detail page, and durably accumulates the collected
//! records so that an interrupted run resumes exactly where it stopped.

pub mod config;
pub mod crawler;
pub mod output;
pub mod retry;
pub mod robots;
pub mod scrape;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Bid-Crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] scrape::FetchError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("URL disallowed by robots.txt: {url}")]
    Robots { url: String },

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crawler::CrawlPhase,
        to: crawler::CrawlPhase,
    },

    #[error("Scheduler error: {0}")]
    Schedule(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("Run {run_id} is already completed")]
    RunCompleted { run_id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Bid-Crawler operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlPhase, CrawlReport, Coordinator, RunOutcome};
pub use retry::{ErrorKind, RetryPolicy};
pub use state::{CrawlState, FailedItem, ProgressCursor, RunStatistics};
pub use storage::{JsonStateStore, StateStore};
