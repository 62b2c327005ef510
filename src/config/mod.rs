//! Configuration module for Bid-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use bid_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Listing URL: {}", config.site.list_url);
//! ```

pub(crate) mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, OutputFormat, RetryConfig, RobotsConfig, ScheduleConfig, SiteConfig,
    StorageConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{
    validate_cron_fields, validate_interval_minutes, validate_run_id, MAX_INTERVAL_MINUTES,
};
