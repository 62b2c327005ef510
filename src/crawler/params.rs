use crate::config::Config;
use crate::retry::RetryPolicy;
use std::time::Duration;

/// Everything the orchestrator needs to know about one run
#[derive(Debug, Clone)]
pub struct RunParameters {
    pub run_id: String,

    /// Reuse a stored, incomplete state for `run_id`
    pub resume: bool,

    /// Last listing page to visit (1-based, inclusive)
    pub max_pages: Option<u32>,

    /// Stop once this many records have been collected
    pub max_items: Option<u64>,

    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
    pub page_delay: Duration,
    pub item_delay: Duration,

    /// Consecutive failed checkpoints tolerated before aborting
    pub max_checkpoint_failures: u32,
}

impl RunParameters {
    /// Parameters with default limits and no delays
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            resume: true,
            max_pages: None,
            max_items: None,
            retry: RetryPolicy::default(),
            fetch_timeout: Duration::from_secs(30),
            page_delay: Duration::ZERO,
            item_delay: Duration::ZERO,
            max_checkpoint_failures: 3,
        }
    }

    /// Parameters taken from a loaded configuration
    pub fn from_config(config: &Config, run_id: impl Into<String>, resume: bool) -> Self {
        Self {
            run_id: run_id.into(),
            resume,
            max_pages: config.crawler.max_pages,
            max_items: config.crawler.max_items,
            retry: RetryPolicy::new(
                config.retry.max_retries,
                config.retry.base_delay,
                config.retry.max_delay,
            ),
            fetch_timeout: config.crawler.fetch_timeout(),
            page_delay: config.crawler.page_delay(),
            item_delay: config.crawler.item_delay(),
            max_checkpoint_failures: config.retry.max_checkpoint_failures,
        }
    }

    /// Returns true once `collected` records satisfy `max_items`
    pub fn item_limit_reached(&self, collected: u64) -> bool {
        self.max_items.is_some_and(|max| collected >= max)
    }

    /// Returns true if `page` lies beyond `max_pages`
    pub fn page_limit_exceeded(&self, page: u32) -> bool {
        self.max_pages.is_some_and(|max| page > max)
    }
}
